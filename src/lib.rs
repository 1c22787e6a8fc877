//! Playlist-driven controller for an externally hosted media player.

pub mod config;
pub mod config_persistence;
pub mod db_manager;
pub mod error;
pub mod headless_host;
pub mod media_reference;
pub mod playback_controller;
pub mod player;
pub mod playlist;
pub mod playlist_store;
pub mod protocol;
pub mod title_lookup;
