use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// Which persisted playlist a store or controller mount is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaylistKind {
    Music, // Background music played during work sessions
    Movie, // Video played in the break overlay
}

impl PlaylistKind {
    /// Key under which this playlist is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            PlaylistKind::Music => "musicPlaylist",
            PlaylistKind::Movie => "moviePlaylist",
        }
    }
}

/// One addressable media reference with a display title.
///
/// Entries are never edited in place; a new title means a new entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Canonical media identifier extracted from `source_url`.
    pub id: String,
    /// Display label.
    pub title: String,
    /// The reference exactly as the user entered it.
    #[serde(rename = "url")]
    pub source_url: String,
}

impl PlaylistEntry {
    pub fn new(id: String, title: String, source_url: String) -> Self {
        Self {
            id,
            title,
            source_url,
        }
    }

    pub fn with_title(&self, title: String) -> Self {
        Self {
            id: self.id.clone(),
            title,
            source_url: self.source_url.clone(),
        }
    }
}

/// Ordered sequence of entries. Duplicate ids are allowed.
///
/// Mutators return a new playlist and leave `self` untouched, so a failed
/// persist never exposes a half-applied edit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Playlist {
        Playlist {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<PlaylistEntry>) -> Playlist {
        Playlist { entries }
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn check_index(&self, index: usize) -> Result<(), ControllerError> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(ControllerError::OutOfRange {
                index,
                len: self.entries.len(),
            })
        }
    }

    pub fn appended(&self, entry: PlaylistEntry) -> Playlist {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries);
        entries.push(entry);
        Playlist { entries }
    }

    pub fn removed_at(&self, index: usize) -> Result<Playlist, ControllerError> {
        self.check_index(index)?;
        let mut entries = self.entries.clone();
        entries.remove(index);
        Ok(Playlist { entries })
    }

    pub fn replaced_at(
        &self,
        index: usize,
        entry: PlaylistEntry,
    ) -> Result<Playlist, ControllerError> {
        self.check_index(index)?;
        let mut entries = self.entries.clone();
        entries[index] = entry;
        Ok(Playlist { entries })
    }

    // Position after `current` in play order, wrapping at the end
    pub fn next_index(&self, current: Option<usize>) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        match current {
            Some(index) => Some((index + 1) % self.entries.len()),
            None => Some(0),
        }
    }

    // Position before `current` in play order, wrapping at the start
    pub fn previous_index(&self, current: Option<usize>) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let len = self.entries.len();
        match current {
            Some(index) if index > 0 => Some((index - 1) % len),
            _ => Some(len - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> PlaylistEntry {
        PlaylistEntry::new(
            id.to_string(),
            format!("title {id}"),
            format!("https://youtu.be/{id}"),
        )
    }

    fn three() -> Playlist {
        Playlist::from_entries(vec![entry("a"), entry("b"), entry("c")])
    }

    #[test]
    fn test_appended_leaves_original_untouched() {
        let original = Playlist::new();
        let next = original.appended(entry("a"));
        assert!(original.is_empty());
        assert_eq!(next.len(), 1);
        assert_eq!(next.get(0), Some(&entry("a")));
    }

    #[test]
    fn test_removed_at_preserves_relative_order() {
        let removed = three().removed_at(1).expect("index in range");
        let ids: Vec<&str> = removed.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_removed_at_out_of_range_fails() {
        assert_eq!(
            three().removed_at(3),
            Err(ControllerError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(
            Playlist::new().removed_at(0),
            Err(ControllerError::OutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let playlist = three();
        assert_eq!(playlist.next_index(Some(2)), Some(0));
        assert_eq!(playlist.next_index(Some(0)), Some(1));
        assert_eq!(playlist.next_index(None), Some(0));
        assert_eq!(playlist.previous_index(Some(0)), Some(2));
        assert_eq!(playlist.previous_index(Some(2)), Some(1));
        assert_eq!(playlist.previous_index(None), Some(2));
        assert_eq!(Playlist::new().next_index(Some(0)), None);
        assert_eq!(Playlist::new().previous_index(None), None);
    }

    #[test]
    fn test_entry_serializes_source_url_as_url() {
        let json = serde_json::to_string(&entry("a")).expect("serialize entry");
        assert_eq!(
            json,
            r#"{"id":"a","title":"title a","url":"https://youtu.be/a"}"#
        );
    }
}
