//! Simulated host player used by the console front-end.
//!
//! Stands in for an embedded media widget: loads take a configurable time to
//! buffer, tracks run for a fixed duration, and configured ids fail as
//! unavailable. All reports flow through [`PlayerEventSender`] exactly like a
//! real host's would.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{
    config::HeadlessConfig,
    player::{
        HostApiLoader, PlayerEvent, PlayerEventSender, PlayerFactory, PlayerHandle, PlayerState,
        ReadyCallback,
    },
};

const CLOCK_TICK: Duration = Duration::from_millis(20);
/// Error code the host reports for missing or private media.
pub const UNAVAILABLE_ERROR_CODE: i32 = 100;

/// Timing and failure behavior of the simulated host.
#[derive(Debug, Clone)]
pub struct SimulationTiming {
    pub track_duration: Duration,
    pub load_latency: Duration,
    pub host_api_latency: Duration,
    pub unavailable_ids: HashSet<String>,
}

impl SimulationTiming {
    pub fn from_config(config: &HeadlessConfig) -> Self {
        Self {
            track_duration: config.track_duration(),
            load_latency: config.load_latency(),
            host_api_latency: config.host_api_latency(),
            unavailable_ids: config.unavailable_ids.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MediaPhase {
    Buffering { ready_at: Instant, offset: Duration },
    Playing { resumed_at: Instant, offset: Duration },
    Paused { offset: Duration },
    Stopped,
    Ended,
    Failed,
}

#[derive(Debug)]
struct SimulatedMedia {
    id: String,
    generation: u64,
    phase: MediaPhase,
}

#[derive(Debug, Default)]
struct SimulatedState {
    media: Option<SimulatedMedia>,
    volume: u8,
    disposed: bool,
}

type SharedState = Arc<Mutex<SimulatedState>>;

fn lock_state(state: &SharedState) -> MutexGuard<'_, SimulatedState> {
    match state.lock() {
        Ok(state) => state,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Advances buffering and playback, returning the transition to report.
fn advance_clock(
    state: &mut SimulatedState,
    now: Instant,
    track_duration: Duration,
) -> Option<(u64, PlayerState)> {
    let media = state.media.as_mut()?;
    match media.phase {
        MediaPhase::Buffering { ready_at, offset } if now >= ready_at => {
            media.phase = MediaPhase::Playing {
                resumed_at: now,
                offset,
            };
            Some((media.generation, PlayerState::Playing))
        }
        MediaPhase::Playing { resumed_at, offset }
            if offset + now.saturating_duration_since(resumed_at) >= track_duration =>
        {
            media.phase = MediaPhase::Ended;
            Some((media.generation, PlayerState::Ended))
        }
        _ => None,
    }
}

fn spawn_clock(state: SharedState, events: PlayerEventSender, track_duration: Duration) {
    thread::spawn(move || loop {
        thread::sleep(CLOCK_TICK);
        let transition = {
            let mut guard = lock_state(&state);
            if guard.disposed {
                break;
            }
            advance_clock(&mut guard, Instant::now(), track_duration)
        };
        if let Some((generation, player_state)) = transition {
            events.state_changed(generation, player_state);
        }
    });
}

/// Player handle backed by a background clock thread.
pub struct SimulatedPlayer {
    state: SharedState,
    events: PlayerEventSender,
    timing: SimulationTiming,
}

impl SimulatedPlayer {
    pub fn spawn(timing: SimulationTiming, events: PlayerEventSender) -> Self {
        let state = Arc::new(Mutex::new(SimulatedState {
            volume: 100,
            ..SimulatedState::default()
        }));
        spawn_clock(Arc::clone(&state), events.clone(), timing.track_duration);
        Self {
            state,
            events,
            timing,
        }
    }

    // Applies `update` to the loaded media and reports the resulting state.
    fn transition<F>(&mut self, update: F)
    where
        F: FnOnce(MediaPhase, Instant) -> Option<(MediaPhase, PlayerState)>,
    {
        let report = {
            let mut state = lock_state(&self.state);
            let Some(media) = state.media.as_mut() else {
                return;
            };
            match update(media.phase, Instant::now()) {
                Some((phase, player_state)) => {
                    media.phase = phase;
                    Some((media.generation, player_state))
                }
                None => None,
            }
        };
        if let Some((generation, player_state)) = report {
            self.events.state_changed(generation, player_state);
        }
    }
}

impl PlayerHandle for SimulatedPlayer {
    fn load_by_id(&mut self, id: &str, start_seconds: f64, generation: u64) {
        let now = Instant::now();
        let unavailable = self.timing.unavailable_ids.contains(id);
        let offset = Duration::from_secs_f64(start_seconds.max(0.0));
        {
            let mut state = lock_state(&self.state);
            state.media = Some(SimulatedMedia {
                id: id.to_string(),
                generation,
                phase: if unavailable {
                    MediaPhase::Failed
                } else {
                    MediaPhase::Buffering {
                        ready_at: now + self.timing.load_latency,
                        offset,
                    }
                },
            });
        }
        debug!("SimulatedPlayer: loading {} (generation={})", id, generation);
        self.events.state_changed(generation, PlayerState::Buffering);
        if unavailable {
            self.events.error(generation, UNAVAILABLE_ERROR_CODE);
        }
    }

    fn play(&mut self) {
        self.transition(|phase, now| match phase {
            MediaPhase::Paused { offset } => Some((
                MediaPhase::Playing {
                    resumed_at: now,
                    offset,
                },
                PlayerState::Playing,
            )),
            _ => None,
        });
    }

    fn pause(&mut self) {
        self.transition(|phase, now| match phase {
            MediaPhase::Playing { resumed_at, offset } => Some((
                MediaPhase::Paused {
                    offset: offset + now.saturating_duration_since(resumed_at),
                },
                PlayerState::Paused,
            )),
            MediaPhase::Buffering { offset, .. } => {
                Some((MediaPhase::Paused { offset }, PlayerState::Paused))
            }
            _ => None,
        });
    }

    fn stop(&mut self) {
        self.transition(|phase, _| match phase {
            MediaPhase::Stopped => None,
            _ => Some((MediaPhase::Stopped, PlayerState::Unstarted)),
        });
    }

    fn seek_to(&mut self, seconds: f64) {
        let target = Duration::from_secs_f64(seconds.max(0.0));
        let mut state = lock_state(&self.state);
        if let Some(media) = state.media.as_mut() {
            media.phase = match media.phase {
                MediaPhase::Playing { .. } => MediaPhase::Playing {
                    resumed_at: Instant::now(),
                    offset: target,
                },
                MediaPhase::Paused { .. } => MediaPhase::Paused { offset: target },
                MediaPhase::Buffering { ready_at, .. } => MediaPhase::Buffering {
                    ready_at,
                    offset: target,
                },
                other => other,
            };
            debug!("SimulatedPlayer: {} seeked to {:.1}s", media.id, seconds);
        }
    }

    fn set_volume(&mut self, volume: u8) {
        lock_state(&self.state).volume = volume;
    }

    fn volume(&self) -> u8 {
        lock_state(&self.state).volume
    }

    fn player_state(&self) -> PlayerState {
        match lock_state(&self.state).media.as_ref().map(|media| media.phase) {
            Some(MediaPhase::Buffering { .. }) => PlayerState::Buffering,
            Some(MediaPhase::Playing { .. }) => PlayerState::Playing,
            Some(MediaPhase::Paused { .. }) => PlayerState::Paused,
            Some(MediaPhase::Ended) => PlayerState::Ended,
            Some(MediaPhase::Stopped) | Some(MediaPhase::Failed) | None => {
                PlayerState::Unstarted
            }
        }
    }

    fn dispose(&mut self) {
        let mut state = lock_state(&self.state);
        state.disposed = true;
        state.media = None;
    }
}

impl Drop for SimulatedPlayer {
    fn drop(&mut self) {
        lock_state(&self.state).disposed = true;
    }
}

/// Creates [`SimulatedPlayer`]s with shared timing.
pub struct SimulatedPlayerFactory {
    timing: SimulationTiming,
}

impl SimulatedPlayerFactory {
    pub fn new(timing: SimulationTiming) -> Self {
        Self { timing }
    }
}

impl PlayerFactory for SimulatedPlayerFactory {
    fn create(&self, events: PlayerEventSender) -> Result<Box<dyn PlayerHandle>, String> {
        Ok(Box::new(SimulatedPlayer::spawn(self.timing.clone(), events)))
    }
}

/// Host API loader that becomes ready after a fixed delay.
pub struct SimulatedHostApiLoader {
    latency: Duration,
}

impl SimulatedHostApiLoader {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl HostApiLoader for SimulatedHostApiLoader {
    fn is_loaded(&self) -> bool {
        false
    }

    fn request(&self, on_ready: ReadyCallback) {
        let latency = self.latency;
        thread::spawn(move || {
            thread::sleep(latency);
            info!("SimulatedHostApiLoader: host API loaded after {:?}", latency);
            on_ready();
        });
    }
}
