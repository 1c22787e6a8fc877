//! Event-bus protocol shared by a controller mount and its collaborators.
//!
//! Presentation commands, host-player notifications, and title-lookup
//! completions all arrive as `Message` values on one bus, so the controller
//! handles them one at a time in arrival order.

use crate::{
    error::ControllerError,
    player::{PlayerNotification, PlayerState},
    playlist::PlaylistEntry,
};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Playlist(PlaylistMessage),
    Player(PlayerMessage),
}

/// Snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub current_entry: Option<PlaylistEntry>,
    /// Playback intent, corrected by confirmed player notifications.
    pub is_playing: bool,
    /// User-selected volume; the player receives 0 while sound is disabled.
    pub volume: u8,
    pub sound_enabled: bool,
    pub playlist: Vec<PlaylistEntry>,
    pub position: Option<usize>,
    pub player_state: PlayerState,
}

/// Playlist-domain commands and notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistMessage {
    AddReference(String),
    PlayPause,
    Next,
    Previous,
    JumpTo(usize),
    Remove(usize),
    Seek(f64),
    SetVolume(i32),
    SetSoundEnabled(bool),
    RequestViewState,
    /// Overlay dismissed; the mount disposes its player and stops.
    Close,
    TitleResolved {
        /// Playlist index at the time the lookup was issued.
        index: usize,
        id: String,
        title: String,
    },
    EntryAdded {
        index: usize,
        entry: PlaylistEntry,
    },
    CommandRejected(ControllerError),
    ViewStateChanged(ViewState),
    Closed,
}

/// Host player lifecycle and state notifications.
#[derive(Debug, Clone)]
pub enum PlayerMessage {
    /// The host player API finished loading.
    HostApiReady,
    Notification(PlayerNotification),
}
