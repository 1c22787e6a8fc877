//! Failure taxonomy for playlist and playback commands.

use thiserror::Error;

/// Errors surfaced to callers of the playlist controller.
///
/// Player-side failures (media unavailable, embedding blocked) are not part of
/// this enum: they arrive as `PlayerEvent::Error` notifications and are
/// recovered by advancing the playlist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// User input does not resolve to a playable media identifier.
    #[error("invalid media reference: {0:?}")]
    InvalidReference(String),
    /// Index-based operation on a position outside `[0, len)`.
    #[error("index {index} out of range for playlist of length {len}")]
    OutOfRange { index: usize, len: usize },
    /// Stored playlist state could not be read or decoded.
    #[error("failed to read persisted playlist: {0}")]
    PersistenceRead(String),
    /// Playlist state could not be written back to storage.
    #[error("failed to persist playlist: {0}")]
    PersistenceWrite(String),
}
