use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use focusjam::{
    config::{default_config_path, load_config_file, Config},
    config_persistence::persist_config_file,
    db_manager::DbManager,
    headless_host::{SimulatedHostApiLoader, SimulatedPlayerFactory, SimulationTiming},
    playback_controller::{ControllerOptions, PlaybackController, TrackEndHook},
    player::HostApiGate,
    playlist::{PlaylistEntry, PlaylistKind},
    playlist_store::PlaylistStore,
    protocol::{Message, PlaylistMessage, ViewState},
    title_lookup::{title_lookup_from_config, TitleLookup},
};
use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};

/// Any value enables debug logging.
const DEBUG_ENV_VAR: &str = "FOCUSJAM_DEBUG";

const HELP_TEXT: &str = "\
commands:
  add <url>     append a media reference
  play          play or pause
  next | prev   skip forward or back
  jump <n>      play entry n
  rm <n>        remove entry n
  seek <secs>   seek within the current track
  vol <0-100>   set volume
  mute | unmute toggle sound
  list          show the active playlist
  break         open the movie break overlay
  close         close the break overlay
  quit          exit";

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Send(PlaylistMessage),
    List,
    StartBreak,
    Help,
    Quit,
}

fn parse_index(argument: Option<&str>, usage: &str) -> Result<usize, String> {
    argument
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(|| format!("usage: {usage}"))
}

fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, Some(rest.trim())),
        None => (line, None),
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "add" => match rest {
            Some(reference) if !reference.is_empty() => {
                ConsoleCommand::Send(PlaylistMessage::AddReference(reference.to_string()))
            }
            _ => return Err("usage: add <url>".to_string()),
        },
        "play" | "pause" | "p" => ConsoleCommand::Send(PlaylistMessage::PlayPause),
        "next" | "n" => ConsoleCommand::Send(PlaylistMessage::Next),
        "prev" | "previous" => ConsoleCommand::Send(PlaylistMessage::Previous),
        "jump" => ConsoleCommand::Send(PlaylistMessage::JumpTo(parse_index(rest, "jump <n>")?)),
        "rm" | "remove" => {
            ConsoleCommand::Send(PlaylistMessage::Remove(parse_index(rest, "rm <n>")?))
        }
        "seek" => {
            let seconds = rest
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .ok_or_else(|| "usage: seek <secs>".to_string())?;
            ConsoleCommand::Send(PlaylistMessage::Seek(seconds))
        }
        "vol" | "volume" => {
            let volume = rest
                .and_then(|value| value.parse::<i32>().ok())
                .ok_or_else(|| "usage: vol <0-100>".to_string())?;
            ConsoleCommand::Send(PlaylistMessage::SetVolume(volume))
        }
        "mute" => ConsoleCommand::Send(PlaylistMessage::SetSoundEnabled(false)),
        "unmute" => ConsoleCommand::Send(PlaylistMessage::SetSoundEnabled(true)),
        "close" => ConsoleCommand::Send(PlaylistMessage::Close),
        "list" | "ls" => ConsoleCommand::List,
        "break" => ConsoleCommand::StartBreak,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

fn mount_label(kind: PlaylistKind) -> &'static str {
    match kind {
        PlaylistKind::Music => "music",
        PlaylistKind::Movie => "movie",
    }
}

fn render_status(kind: PlaylistKind, view: &ViewState) -> String {
    let sound = if view.sound_enabled {
        format!("vol {}", view.volume)
    } else {
        format!("muted (vol {})", view.volume)
    };
    match (&view.current_entry, view.position) {
        (Some(entry), Some(position)) => format!(
            "[{}] {} #{} {} | {:?} | {}",
            mount_label(kind),
            if view.is_playing { "playing" } else { "paused" },
            position,
            entry.title,
            view.player_state,
            sound
        ),
        _ => format!(
            "[{}] nothing selected ({} entries) | {}",
            mount_label(kind),
            view.playlist.len(),
            sound
        ),
    }
}

fn render_playlist(view: &ViewState) -> Vec<String> {
    if view.playlist.is_empty() {
        return vec!["  (empty)".to_string()];
    }
    view.playlist
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let marker = if Some(index) == view.position { '>' } else { ' ' };
            format!("{marker} {index:>3}  {}  [{}]", entry.title, entry.id)
        })
        .collect()
}

/// Shared pieces every controller mount is built from.
struct MountContext<'a> {
    config: &'a Config,
    gate: &'a HostApiGate,
    title_lookup: Arc<dyn TitleLookup>,
    database_path: &'a Path,
}

/// A running controller with its bus and console printer.
struct Mount {
    kind: PlaylistKind,
    bus_sender: Sender<Message>,
    controller_thread: JoinHandle<()>,
    printer_thread: JoinHandle<()>,
    latest_view: Arc<Mutex<Option<ViewState>>>,
}

impl Mount {
    fn is_open(&self) -> bool {
        !self.controller_thread.is_finished()
    }

    fn send(&self, message: PlaylistMessage) {
        if self.bus_sender.send(Message::Playlist(message)).is_err() {
            warn!("Console: {} mount is no longer listening", mount_label(self.kind));
        }
    }

    fn latest_view(&self) -> Option<ViewState> {
        match self.latest_view.lock() {
            Ok(view) => view.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Closes the mount and returns its final view state.
    fn close(self) -> Option<ViewState> {
        if self.is_open() {
            self.send(PlaylistMessage::Close);
        }
        if let Err(payload) = self.controller_thread.join() {
            log::error!(
                "{} controller thread terminated due to panic: {}",
                mount_label(self.kind),
                panic_payload_to_string(payload.as_ref())
            );
        }
        if self.printer_thread.join().is_err() {
            warn!("Console: {} printer thread panicked", mount_label(self.kind));
        }
        match self.latest_view.lock() {
            Ok(mut view) => view.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

fn spawn_view_printer(
    kind: PlaylistKind,
    mut receiver: Receiver<Message>,
    latest_view: Arc<Mutex<Option<ViewState>>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let label = mount_label(kind);
        let mut last_status = String::new();
        loop {
            match receiver.blocking_recv() {
                Ok(Message::Playlist(PlaylistMessage::ViewStateChanged(view))) => {
                    let status = render_status(kind, &view);
                    if status != last_status {
                        println!("{status}");
                        last_status = status;
                    }
                    match latest_view.lock() {
                        Ok(mut latest) => *latest = Some(view),
                        Err(poisoned) => *poisoned.into_inner() = Some(view),
                    }
                }
                Ok(Message::Playlist(PlaylistMessage::EntryAdded { index, entry })) => {
                    println!("[{label}] added #{index} {}", entry.id);
                }
                Ok(Message::Playlist(PlaylistMessage::CommandRejected(err))) => {
                    println!("[{label}] {err}");
                }
                Ok(Message::Playlist(PlaylistMessage::Closed)) => {
                    println!("[{label}] closed");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Console: {} printer lagged by {} messages", label, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn close_on_track_end(bus_sender: Sender<Message>) -> TrackEndHook {
    Box::new(move |entry: Option<&PlaylistEntry>| {
        info!(
            "Break finished after {}",
            entry.map_or("an unknown entry", |entry| entry.title.as_str())
        );
        let _ = bus_sender.send(Message::Playlist(PlaylistMessage::Close));
    })
}

fn spawn_mount(
    kind: PlaylistKind,
    context: &MountContext<'_>,
    close_when_finished: bool,
) -> Result<Mount, String> {
    let (bus_sender, _) = broadcast::channel(1024);
    let db_manager = DbManager::new(context.database_path).map_err(|err| {
        format!(
            "failed to open playlist database {}: {}",
            context.database_path.display(),
            err
        )
    })?;
    let store = PlaylistStore::open(Box::new(db_manager), kind);
    let options = ControllerOptions {
        volume: context.config.player.volume,
        sound_enabled: context.config.player.sound_enabled,
        on_track_end: close_when_finished.then(|| close_on_track_end(bus_sender.clone())),
    };
    let factory = SimulatedPlayerFactory::new(SimulationTiming::from_config(
        &context.config.headless,
    ));

    let latest_view = Arc::new(Mutex::new(None));
    let printer_thread = spawn_view_printer(kind, bus_sender.subscribe(), Arc::clone(&latest_view));

    let mut controller = PlaybackController::new(
        store,
        Box::new(factory),
        Arc::clone(&context.title_lookup),
        options,
        bus_sender.subscribe(),
        bus_sender.clone(),
    );
    controller.mount(context.gate);
    let controller_thread = thread::Builder::new()
        .name(format!("{}-controller", mount_label(kind)))
        .spawn(move || controller.run())
        .map_err(|err| format!("failed to start {} controller: {}", mount_label(kind), err))?;
    debug!("Console: {} mount started", mount_label(kind));

    Ok(Mount {
        kind,
        bus_sender,
        controller_thread,
        printer_thread,
        latest_view,
    })
}

fn print_playlist(mount: &Mount) {
    println!("{} playlist:", mount_label(mount.kind));
    match mount.latest_view() {
        Some(view) => {
            for line in render_playlist(&view) {
                println!("{line}");
            }
        }
        None => println!("  (loading)"),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    let level = if std::env::var_os(DEBUG_ENV_VAR).is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path: PathBuf = default_config_path();
    let mut config = load_config_file(&config_path);
    let database_path = config.storage.database_path();
    info!(
        "Using config {} and playlist database {}",
        config_path.display(),
        database_path.display()
    );

    let title_lookup: Arc<dyn TitleLookup> =
        Arc::from(title_lookup_from_config(&config.title_lookup));
    let gate = HostApiGate::new(Box::new(SimulatedHostApiLoader::new(
        config.headless.host_api_latency(),
    )));
    let context = MountContext {
        config: &config,
        gate: &gate,
        title_lookup,
        database_path: &database_path,
    };

    let music = spawn_mount(PlaylistKind::Music, &context, false)?;
    let mut movie: Option<Mount> = None;
    println!("{HELP_TEXT}");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        if movie.as_ref().is_some_and(|mount| !mount.is_open()) {
            if let Some(finished) = movie.take() {
                finished.close();
                println!("Break over, back to music");
            }
        }

        match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Help => println!("{HELP_TEXT}"),
            ConsoleCommand::List => print_playlist(movie.as_ref().unwrap_or(&music)),
            ConsoleCommand::StartBreak => {
                if movie.is_some() {
                    println!("A break is already running; 'close' ends it");
                    continue;
                }
                if music.latest_view().is_some_and(|view| view.is_playing) {
                    music.send(PlaylistMessage::PlayPause);
                }
                match spawn_mount(PlaylistKind::Movie, &context, true) {
                    Ok(mount) => movie = Some(mount),
                    Err(err) => println!("Could not start break: {err}"),
                }
            }
            ConsoleCommand::Send(PlaylistMessage::Close) => match movie.take() {
                Some(mount) => {
                    mount.close();
                    println!("Break over, back to music");
                }
                None => println!("No break is running"),
            },
            ConsoleCommand::Send(message) => movie.as_ref().unwrap_or(&music).send(message),
        }
    }

    if let Some(mount) = movie.take() {
        mount.close();
    }
    if let Some(view) = music.close() {
        config.player.volume = view.volume;
        config.player.sound_enabled = view.sound_enabled;
    }
    persist_config_file(&config, &config_path);

    info!("Application exiting");
    Ok(())
}
