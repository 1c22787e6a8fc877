//! Playlist-driven controller for one external player mount.
//!
//! The controller owns the playlist position and the user's play/pause intent,
//! issues commands to the host player, and reconciles the player's
//! asynchronous notifications with that state. All inputs are funneled through
//! [`PlaybackController::handle_message`], either directly or from the bus in
//! [`PlaybackController::run`].

use std::sync::Arc;
use std::thread;

use log::{debug, error, info, trace, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::{
    error::ControllerError,
    media_reference::extract_media_id,
    player::{
        HostApiGate, PlayerEvent, PlayerEventSender, PlayerFactory, PlayerHandle,
        PlayerNotification, PlayerState,
    },
    playlist::{PlaylistEntry, PlaylistKind},
    playlist_store::PlaylistStore,
    protocol::{Message, PlayerMessage, PlaylistMessage, ViewState},
    title_lookup::{placeholder_title, TitleLookup},
};

/// Upper bound of the volume scale.
pub const MAX_VOLUME: u8 = 100;

/// Host override for end-of-track handling. Receives the entry that ended.
pub type TrackEndHook = Box<dyn FnMut(Option<&PlaylistEntry>) + Send>;

/// Construction-time settings for a controller mount.
pub struct ControllerOptions {
    pub volume: u8,
    pub sound_enabled: bool,
    /// When set, finished or failed tracks are reported here instead of
    /// advancing the playlist.
    pub on_track_end: Option<TrackEndHook>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            volume: 70,
            sound_enabled: true,
            on_track_end: None,
        }
    }
}

/// Media most recently handed to the player.
#[derive(Debug, Clone, PartialEq)]
struct LoadedMedia {
    id: String,
}

/// Playlist edits the position must be reconciled against.
#[derive(Debug, Clone, Copy)]
enum PlaylistMutation {
    Appended { index: usize },
    Removed { index: usize },
    TitlePatched,
}

/// Clamps a requested volume into `0..=MAX_VOLUME`.
pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, i32::from(MAX_VOLUME)) as u8
}

/// Coordinates one playlist with one host player handle.
pub struct PlaybackController {
    store: PlaylistStore,
    position: Option<usize>,
    intent: bool,
    external_state: PlayerState,
    volume: u8,
    sound_enabled: bool,
    player_factory: Box<dyn PlayerFactory>,
    player: Option<Box<dyn PlayerHandle>>,
    disposed: bool,
    load_generation: u64,
    loaded: Option<LoadedMedia>,
    title_lookup: Arc<dyn TitleLookup>,
    on_track_end: Option<TrackEndHook>,
    host_api: Option<HostApiGate>,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl PlaybackController {
    /// Creates a controller bound to bus channels, storage, and a player factory.
    pub fn new(
        store: PlaylistStore,
        player_factory: Box<dyn PlayerFactory>,
        title_lookup: Arc<dyn TitleLookup>,
        options: ControllerOptions,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        Self {
            store,
            position: None,
            intent: false,
            external_state: PlayerState::Unstarted,
            volume: options.volume.min(MAX_VOLUME),
            sound_enabled: options.sound_enabled,
            player_factory,
            player: None,
            disposed: false,
            load_generation: 0,
            loaded: None,
            title_lookup,
            on_track_end: options.on_track_end,
            host_api: None,
            bus_consumer,
            bus_producer,
        }
    }

    /// Subscribes this mount to the host API ready signal.
    pub fn mount(&mut self, gate: &HostApiGate) {
        let bus_producer = self.bus_producer.clone();
        gate.when_ready(Box::new(move || {
            let _ = bus_producer.send(Message::Player(PlayerMessage::HostApiReady));
        }));
        self.host_api = Some(gate.clone());
    }

    pub fn kind(&self) -> PlaylistKind {
        self.store.kind()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.intent
    }

    pub fn external_state(&self) -> PlayerState {
        self.external_state
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_player_ready(&self) -> bool {
        self.player.is_some()
    }

    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        self.position.and_then(|index| self.store.playlist().get(index))
    }

    pub fn view_state(&self) -> ViewState {
        ViewState {
            current_entry: self.current_entry().cloned(),
            is_playing: self.intent,
            volume: self.volume,
            sound_enabled: self.sound_enabled,
            playlist: self.store.playlist().entries().to_vec(),
            position: self.position,
            player_state: self.external_state,
        }
    }

    fn effective_volume(&self) -> u8 {
        if self.sound_enabled {
            self.volume
        } else {
            0
        }
    }

    // Keeps `position` pointing at the same logical entry after an edit.
    fn reconcile_position(&mut self, mutation: PlaylistMutation) {
        let len = self.store.playlist().len();
        match mutation {
            PlaylistMutation::Appended { index } => {
                if index == 0 && self.position.is_none() {
                    self.position = Some(0);
                }
            }
            PlaylistMutation::Removed { index } => match self.position {
                Some(current) if current == index => {
                    self.stop_active_playback();
                    self.position = if len > 0 { Some(0) } else { None };
                }
                Some(current) if index < current => {
                    self.position = Some(current - 1);
                }
                _ => {}
            },
            PlaylistMutation::TitlePatched => {}
        }
        if self.position.is_some_and(|current| current >= len) {
            warn!(
                "PlaybackController: position {:?} outside playlist of {}; resetting",
                self.position, len
            );
            self.position = if len > 0 { Some(0) } else { None };
        }
    }

    fn stop_active_playback(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
        // Notifications still in flight for the stopped media become stale.
        self.load_generation += 1;
        self.loaded = None;
        self.intent = false;
    }

    fn load_current(&mut self) {
        let Some(entry) = self.current_entry().cloned() else {
            return;
        };
        let Some(player) = self.player.as_mut() else {
            debug!(
                "PlaybackController: host player not ready; deferring load of {}",
                entry.id
            );
            return;
        };
        self.load_generation += 1;
        let generation = self.load_generation;
        debug!(
            "PlaybackController: loading {} (position={:?}, generation={})",
            entry.id, self.position, generation
        );
        player.load_by_id(&entry.id, 0.0, generation);
        player.set_volume(if self.sound_enabled { self.volume } else { 0 });
        self.loaded = Some(LoadedMedia { id: entry.id });
    }

    fn start_playback_at(&mut self, index: usize) {
        self.position = Some(index);
        self.intent = true;
        self.load_current();
    }

    fn spawn_title_lookup(&self, index: usize, id: String) {
        if !self.title_lookup.is_enabled() {
            return;
        }
        let title_lookup = Arc::clone(&self.title_lookup);
        let bus_producer = self.bus_producer.clone();
        thread::spawn(move || {
            if let Some(title) = title_lookup.resolve_title(&id) {
                let _ = bus_producer.send(Message::Playlist(PlaylistMessage::TitleResolved {
                    index,
                    id,
                    title,
                }));
            }
        });
    }

    /// Resolves `reference` and appends it to the playlist.
    ///
    /// The entry is appended with a placeholder title; a resolved title is
    /// patched in when the lookup completes. Adding never starts playback.
    pub fn add(&mut self, reference: &str) -> Result<usize, ControllerError> {
        let id = extract_media_id(reference)
            .ok_or_else(|| ControllerError::InvalidReference(reference.trim().to_string()))?;
        let entry = PlaylistEntry::new(id.clone(), placeholder_title(&id), reference.to_string());
        let playlist = self.store.append(entry.clone());
        let index = playlist.len() - 1;
        self.reconcile_position(PlaylistMutation::Appended { index });
        info!("PlaybackController: added {} at {}", id, index);

        self.spawn_title_lookup(index, id);
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::EntryAdded { index, entry }));
        Ok(index)
    }

    /// Select-and-play when nothing is selected, otherwise toggles playback.
    pub fn play_pause(&mut self) {
        if self.store.playlist().is_empty() {
            return;
        }
        let Some(index) = self.position else {
            self.start_playback_at(0);
            return;
        };

        if self.intent {
            if let Some(player) = self.player.as_mut() {
                player.pause();
            }
            self.intent = false;
            return;
        }

        let entry_id = self.store.playlist().get(index).map(|entry| entry.id.as_str());
        let loaded_matches = self.loaded.as_ref().map(|loaded| loaded.id.as_str()) == entry_id;
        let resumable = loaded_matches && self.external_state != PlayerState::Ended;
        self.intent = true;
        if resumable {
            if let Some(player) = self.player.as_mut() {
                player.play();
                return;
            }
        }
        self.load_current();
    }

    pub fn next(&mut self) {
        if let Some(index) = self.store.playlist().next_index(self.position) {
            self.start_playback_at(index);
        }
    }

    pub fn previous(&mut self) {
        if let Some(index) = self.store.playlist().previous_index(self.position) {
            self.start_playback_at(index);
        }
    }

    pub fn jump_to(&mut self, index: usize) -> Result<(), ControllerError> {
        self.store.playlist().check_index(index)?;
        self.start_playback_at(index);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<(), ControllerError> {
        self.store.remove_at(index)?;
        self.reconcile_position(PlaylistMutation::Removed { index });
        info!(
            "PlaybackController: removed entry {} (position now {:?})",
            index, self.position
        );
        Ok(())
    }

    pub fn seek(&mut self, seconds: f64) {
        if self.loaded.is_none() {
            return;
        }
        if let Some(player) = self.player.as_mut() {
            player.seek_to(seconds.max(0.0));
        }
    }

    fn apply_volume(&mut self) {
        let effective = self.effective_volume();
        if let Some(player) = self.player.as_mut() {
            player.set_volume(effective);
        }
    }

    /// Stores the clamped volume and forwards the effective value to the player.
    pub fn set_volume(&mut self, volume: i32) -> u8 {
        self.volume = clamp_volume(volume);
        self.apply_volume();
        self.volume
    }

    /// Mutes or unmutes without touching the stored volume.
    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
        self.apply_volume();
    }

    fn on_title_resolved(&mut self, index: usize, id: &str, title: &str) {
        match self.store.patch_title(index, id, title) {
            Some(patched) => {
                trace!("PlaybackController: title for {} patched at {}", id, patched);
                self.reconcile_position(PlaylistMutation::TitlePatched);
            }
            None => debug!(
                "PlaybackController: dropping title for {}; entry no longer present",
                id
            ),
        }
    }

    fn on_host_api_ready(&mut self) {
        if self.player.is_some() || self.disposed {
            return;
        }
        let events = PlayerEventSender::new(self.bus_producer.clone());
        match self.player_factory.create(events) {
            Ok(player) => {
                info!("PlaybackController: host player ready");
                self.player = Some(player);
                self.apply_volume();
                if self.intent {
                    self.load_current();
                }
            }
            Err(err) => error!("PlaybackController: failed to create host player: {}", err),
        }
    }

    fn on_track_finished(&mut self) {
        if let Some(hook) = self.on_track_end.as_mut() {
            self.intent = false;
            let playlist = self.store.playlist();
            hook(self.position.and_then(|index| playlist.get(index)));
            return;
        }
        self.next();
    }

    /// Merges one player notification into controller state.
    pub fn on_player_notification(&mut self, notification: PlayerNotification) {
        if let PlayerEvent::StateChanged(state) = notification.event {
            self.external_state = state;
        }
        if notification.generation != self.load_generation {
            trace!(
                "PlaybackController: ignoring stale {:?} (generation {} != {})",
                notification.event,
                notification.generation,
                self.load_generation
            );
            return;
        }

        match notification.event {
            PlayerEvent::StateChanged(PlayerState::Ended) => {
                debug!("PlaybackController: track ended");
                self.on_track_finished();
            }
            PlayerEvent::Error { code } => {
                warn!(
                    "PlaybackController: player error {} for {:?}; skipping",
                    code,
                    self.loaded.as_ref().map(|loaded| loaded.id.as_str())
                );
                self.on_track_finished();
            }
            PlayerEvent::StateChanged(PlayerState::Playing) => self.intent = true,
            PlayerEvent::StateChanged(PlayerState::Paused) => self.intent = false,
            PlayerEvent::StateChanged(_) => {}
        }
    }

    /// Re-derives state the bus may have dropped after `skipped` messages.
    ///
    /// The ready signal is re-checked on the gate and the loaded media's state
    /// is read back from the player, so a lost `Ended` still advances.
    pub fn resync_after_lag(&mut self, skipped: u64) {
        warn!(
            "PlaybackController: bus lagged, skipped {} messages; resyncing",
            skipped
        );
        let host_ready = self.host_api.as_ref().is_some_and(HostApiGate::is_ready);
        if self.player.is_none() && host_ready {
            self.on_host_api_ready();
        }
        if self.loaded.is_some() {
            if let Some(state) = self.player.as_ref().map(|player| player.player_state()) {
                if state == PlayerState::Ended && !self.intent {
                    // End already handled by the track-end hook.
                    self.external_state = state;
                } else {
                    self.on_player_notification(PlayerNotification {
                        generation: self.load_generation,
                        event: PlayerEvent::StateChanged(state),
                    });
                }
            }
        }
        self.broadcast_view_state();
    }

    /// Releases the host player. Safe to call repeatedly or before ready.
    pub fn dispose(&mut self) {
        self.disposed = true;
        if let Some(mut player) = self.player.take() {
            info!("PlaybackController: disposing host player");
            player.dispose();
        }
    }

    fn reject(&self, err: ControllerError) {
        warn!("PlaybackController: command rejected: {}", err);
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::CommandRejected(err)));
    }

    fn broadcast_view_state(&self) {
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::ViewStateChanged(
                self.view_state(),
            )));
    }

    /// Applies one inbound message. Returns `false` once the mount should close.
    pub fn handle_message(&mut self, message: Message) -> bool {
        let changed = match message {
            Message::Playlist(PlaylistMessage::AddReference(reference)) => {
                if let Err(err) = self.add(&reference) {
                    self.reject(err);
                }
                true
            }
            Message::Playlist(PlaylistMessage::PlayPause) => {
                self.play_pause();
                true
            }
            Message::Playlist(PlaylistMessage::Next) => {
                self.next();
                true
            }
            Message::Playlist(PlaylistMessage::Previous) => {
                self.previous();
                true
            }
            Message::Playlist(PlaylistMessage::JumpTo(index)) => {
                if let Err(err) = self.jump_to(index) {
                    self.reject(err);
                }
                true
            }
            Message::Playlist(PlaylistMessage::Remove(index)) => {
                if let Err(err) = self.remove(index) {
                    self.reject(err);
                }
                true
            }
            Message::Playlist(PlaylistMessage::Seek(seconds)) => {
                self.seek(seconds);
                true
            }
            Message::Playlist(PlaylistMessage::SetVolume(volume)) => {
                self.set_volume(volume);
                true
            }
            Message::Playlist(PlaylistMessage::SetSoundEnabled(enabled)) => {
                self.set_sound_enabled(enabled);
                true
            }
            Message::Playlist(PlaylistMessage::RequestViewState) => true,
            Message::Playlist(PlaylistMessage::TitleResolved { index, id, title }) => {
                self.on_title_resolved(index, &id, &title);
                true
            }
            Message::Playlist(PlaylistMessage::Close) => {
                debug!("PlaybackController: close requested");
                return false;
            }
            Message::Player(PlayerMessage::HostApiReady) => {
                self.on_host_api_ready();
                true
            }
            Message::Player(PlayerMessage::Notification(notification)) => {
                self.on_player_notification(notification);
                true
            }
            Message::Playlist(PlaylistMessage::EntryAdded { .. })
            | Message::Playlist(PlaylistMessage::CommandRejected(_))
            | Message::Playlist(PlaylistMessage::ViewStateChanged(_))
            | Message::Playlist(PlaylistMessage::Closed) => false,
        };
        if changed {
            self.broadcast_view_state();
        }
        true
    }

    /// Processes bus messages until closed, then disposes the player.
    pub fn run(&mut self) {
        info!(
            "PlaybackController: mounted {:?} playlist with {} entries",
            self.kind(),
            self.store.playlist().len()
        );
        self.broadcast_view_state();
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => {
                    if !self.handle_message(message) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => self.resync_after_lag(skipped),
                Err(RecvError::Closed) => break,
            }
        }
        self.dispose();
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::Closed));
        info!("PlaybackController: unmounted {:?} playlist", self.kind());
    }
}
