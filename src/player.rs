//! Contract for the host-provided embeddable player.
//!
//! The controller never talks to a concrete widget. It receives a
//! [`PlayerFactory`] at construction, creates one [`PlayerHandle`] once the
//! process-wide [`HostApiGate`] reports the host API as ready, and observes
//! every state transition through [`PlayerNotification`]s on its bus.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, PlayerMessage};

/// Lifecycle states reported by the host player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    /// Maps the host's numeric state code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(PlayerState::Unstarted),
            0 => Some(PlayerState::Ended),
            1 => Some(PlayerState::Playing),
            2 => Some(PlayerState::Paused),
            3 => Some(PlayerState::Buffering),
            5 => Some(PlayerState::Cued),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PlayerState::Unstarted => -1,
            PlayerState::Ended => 0,
            PlayerState::Playing => 1,
            PlayerState::Paused => 2,
            PlayerState::Buffering => 3,
            PlayerState::Cued => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    StateChanged(PlayerState),
    /// Media unavailable, embedding blocked, etc. `code` is the host's raw code.
    Error { code: i32 },
}

/// One asynchronous report from the host player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerNotification {
    /// Generation passed with the most recent `load_by_id` the handle received.
    pub generation: u64,
    pub event: PlayerEvent,
}

/// Channel a player handle uses to report notifications.
#[derive(Clone)]
pub struct PlayerEventSender {
    bus_producer: Sender<Message>,
}

impl PlayerEventSender {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self { bus_producer }
    }

    pub fn send(&self, generation: u64, event: PlayerEvent) {
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::Notification(
                PlayerNotification { generation, event },
            )));
    }

    pub fn state_changed(&self, generation: u64, state: PlayerState) {
        self.send(generation, PlayerEvent::StateChanged(state));
    }

    pub fn error(&self, generation: u64, code: i32) {
        self.send(generation, PlayerEvent::Error { code });
    }
}

/// Commands accepted by a live host player.
///
/// Commands return immediately; their effects are only observable through
/// notifications. Redundant calls (pausing while paused) must be tolerated.
pub trait PlayerHandle: Send {
    /// Starts loading new media, superseding any load still in flight.
    /// Subsequent notifications carry `generation`.
    fn load_by_id(&mut self, id: &str, start_seconds: f64, generation: u64);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek_to(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: u8);
    fn volume(&self) -> u8;
    /// State of the loaded media as the host reports it right now.
    fn player_state(&self) -> PlayerState;
    /// Releases the underlying widget.
    fn dispose(&mut self);
}

/// Creates player handles once the host API is ready.
pub trait PlayerFactory: Send {
    fn create(&self, events: PlayerEventSender) -> Result<Box<dyn PlayerHandle>, String>;
}

pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Loads the host player API.
pub trait HostApiLoader: Send + Sync {
    /// True when the host API is already present in the process.
    fn is_loaded(&self) -> bool;
    /// Requests the host API; `on_ready` must be invoked once it is usable.
    fn request(&self, on_ready: ReadyCallback);
}

enum GateState {
    Idle,
    Requested(Vec<ReadyCallback>),
    Ready,
}

struct GateInner {
    state: Mutex<GateState>,
    loader: Box<dyn HostApiLoader>,
}

/// Process-wide one-time gate around host API loading.
///
/// Clones share state, so every mount can hold one. The API is requested at
/// most once and exactly one ready callback is registered with the loader;
/// mounts waiting on it are notified when it fires, later mounts immediately.
#[derive(Clone)]
pub struct HostApiGate {
    inner: Arc<GateInner>,
}

impl HostApiGate {
    pub fn new(loader: Box<dyn HostApiLoader>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState::Idle),
                loader,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), GateState::Ready)
    }

    /// Runs `callback` once the host API is ready (immediately if it already is).
    pub fn when_ready(&self, callback: ReadyCallback) {
        let mut state = self.lock_state();
        if let GateState::Requested(waiting) = &mut *state {
            waiting.push(callback);
            return;
        }
        if matches!(*state, GateState::Ready) {
            drop(state);
            callback();
            return;
        }
        if self.inner.loader.is_loaded() {
            debug!("HostApiGate: host API already loaded");
            *state = GateState::Ready;
            drop(state);
            callback();
            return;
        }

        *state = GateState::Requested(vec![callback]);
        drop(state);
        info!("HostApiGate: requesting host player API");
        let gate = self.clone();
        self.inner
            .loader
            .request(Box::new(move || gate.mark_ready()));
    }

    fn mark_ready(&self) {
        let waiting = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, GateState::Ready) {
                GateState::Requested(waiting) => waiting,
                GateState::Idle | GateState::Ready => Vec::new(),
            }
        };
        debug!("HostApiGate: host API ready, notifying {} mount(s)", waiting.len());
        for callback in waiting {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ManualLoader {
        requests: Arc<AtomicUsize>,
        pending: Arc<Mutex<Vec<ReadyCallback>>>,
        preloaded: bool,
    }

    impl HostApiLoader for ManualLoader {
        fn is_loaded(&self) -> bool {
            self.preloaded
        }

        fn request(&self, on_ready: ReadyCallback) {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().expect("loader lock").push(on_ready);
        }
    }

    fn counter_callback(counter: &Arc<AtomicUsize>) -> ReadyCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_state_codes_map_both_ways() {
        for state in [
            PlayerState::Unstarted,
            PlayerState::Ended,
            PlayerState::Playing,
            PlayerState::Paused,
            PlayerState::Buffering,
            PlayerState::Cued,
        ] {
            assert_eq!(PlayerState::from_code(state.code()), Some(state));
        }
        assert_eq!(PlayerState::from_code(4), None);
    }

    #[test]
    fn test_gate_requests_api_once_for_many_mounts() {
        let requests = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(Mutex::new(Vec::new()));
        let gate = HostApiGate::new(Box::new(ManualLoader {
            requests: Arc::clone(&requests),
            pending: Arc::clone(&pending),
            preloaded: false,
        }));
        let notified = Arc::new(AtomicUsize::new(0));

        gate.when_ready(counter_callback(&notified));
        gate.clone().when_ready(counter_callback(&notified));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
        assert!(!gate.is_ready());

        let ready = pending.lock().expect("loader lock").pop().expect("ready callback");
        ready();
        assert!(gate.is_ready());
        assert_eq!(notified.load(Ordering::SeqCst), 2);

        gate.when_ready(counter_callback(&notified));
        assert_eq!(notified.load(Ordering::SeqCst), 3);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gate_skips_request_when_api_already_loaded() {
        let requests = Arc::new(AtomicUsize::new(0));
        let gate = HostApiGate::new(Box::new(ManualLoader {
            requests: Arc::clone(&requests),
            pending: Arc::new(Mutex::new(Vec::new())),
            preloaded: true,
        }));
        let notified = Arc::new(AtomicUsize::new(0));
        gate.when_ready(counter_callback(&notified));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_sender_stamps_generation() {
        let (bus_sender, mut receiver) = tokio::sync::broadcast::channel(16);
        let events = PlayerEventSender::new(bus_sender);
        events.error(7, 150);
        match receiver.try_recv().expect("notification") {
            Message::Player(PlayerMessage::Notification(notification)) => {
                assert_eq!(
                    notification,
                    PlayerNotification {
                        generation: 7,
                        event: PlayerEvent::Error { code: 150 },
                    }
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
