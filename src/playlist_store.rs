//! Persisted playlist storage.
//!
//! Every mutation serializes and writes the whole playlist before the new
//! value becomes visible, so storage never holds a partially applied edit.

use log::{debug, error, warn};

use crate::{
    error::ControllerError,
    playlist::{Playlist, PlaylistEntry, PlaylistKind},
    title_lookup::placeholder_title,
};

/// String key-value persistence capability.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// Owns one persisted playlist.
pub struct PlaylistStore {
    storage: Box<dyn KeyValueStore>,
    kind: PlaylistKind,
    playlist: Playlist,
}

impl PlaylistStore {
    /// Opens the store and restores the last persisted playlist.
    pub fn open(storage: Box<dyn KeyValueStore>, kind: PlaylistKind) -> Self {
        let mut store = Self {
            storage,
            kind,
            playlist: Playlist::new(),
        };
        store.load();
        store
    }

    pub fn kind(&self) -> PlaylistKind {
        self.kind
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    fn read_persisted(&self) -> Result<Playlist, ControllerError> {
        let key = self.kind.storage_key();
        let Some(raw) = self
            .storage
            .get(key)
            .map_err(ControllerError::PersistenceRead)?
        else {
            return Ok(Playlist::new());
        };
        let entries: Vec<PlaylistEntry> = serde_json::from_str(&raw)
            .map_err(|err| ControllerError::PersistenceRead(format!("{key}: {err}")))?;
        Ok(Playlist::from_entries(entries))
    }

    /// Replaces the in-memory playlist with the persisted one.
    ///
    /// Missing or unreadable state loads as an empty playlist.
    pub fn load(&mut self) -> Playlist {
        self.playlist = match self.read_persisted() {
            Ok(playlist) => {
                debug!(
                    "PlaylistStore: restored {} entries for {}",
                    playlist.len(),
                    self.kind.storage_key()
                );
                playlist
            }
            Err(err) => {
                warn!("PlaylistStore: {}. Starting with an empty playlist", err);
                Playlist::new()
            }
        };
        self.playlist.clone()
    }

    fn persist(&self, playlist: &Playlist) -> Result<(), ControllerError> {
        let payload = serde_json::to_string(playlist.entries())
            .map_err(|err| ControllerError::PersistenceWrite(err.to_string()))?;
        self.storage
            .set(self.kind.storage_key(), &payload)
            .map_err(ControllerError::PersistenceWrite)
    }

    fn commit(&mut self, next: Playlist) -> Playlist {
        if let Err(err) = self.persist(&next) {
            error!("PlaylistStore: {}", err);
        }
        self.playlist = next;
        self.playlist.clone()
    }

    pub fn append(&mut self, entry: PlaylistEntry) -> Playlist {
        let next = self.playlist.appended(entry);
        self.commit(next)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Playlist, ControllerError> {
        let next = self.playlist.removed_at(index)?;
        Ok(self.commit(next))
    }

    // Entry at `index` when its id still matches, else the nearest earlier
    // entry with this id that still shows the placeholder title.
    fn locate_title_target(&self, index: usize, id: &str) -> Option<usize> {
        if self.playlist.get(index).is_some_and(|entry| entry.id == id) {
            return Some(index);
        }
        let placeholder = placeholder_title(id);
        let upper = index.min(self.playlist.len());
        (0..upper).rev().find(|&candidate| {
            self.playlist
                .get(candidate)
                .is_some_and(|entry| entry.id == id && entry.title == placeholder)
        })
    }

    /// Swaps in a resolved title for the entry added at `index`.
    ///
    /// Returns the patched position, or `None` when the entry is gone.
    pub fn patch_title(&mut self, index: usize, id: &str, title: &str) -> Option<usize> {
        let target = self.locate_title_target(index, id)?;
        let entry = self.playlist.get(target)?.with_title(title.to_string());
        let next = self.playlist.replaced_at(target, entry).ok()?;
        self.commit(next);
        Some(target)
    }
}
