//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

/// Environment variable that overrides `title_lookup.api_key`.
pub const API_KEY_ENV_VAR: &str = "FOCUSJAM_YOUTUBE_API_KEY";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Player volume and sound preferences.
    pub player: PlayerConfig,
    #[serde(default)]
    /// Title resolution service settings.
    pub title_lookup: TitleLookupConfig,
    #[serde(default)]
    /// Playlist storage location.
    pub storage: StorageConfig,
    #[serde(default)]
    /// Simulated host player used by the console front-end.
    pub headless: HeadlessConfig,
}

/// Volume preferences persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume", deserialize_with = "deserialize_volume")]
    pub volume: u8,
    /// When false the player is muted regardless of `volume`.
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TitleLookupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_title_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_title_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// SQLite file holding persisted playlists. Empty selects the data dir default.
    #[serde(default)]
    pub database_file: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HeadlessConfig {
    #[serde(default = "default_track_duration_secs")]
    pub track_duration_secs: u64,
    #[serde(default = "default_load_latency_ms")]
    pub load_latency_ms: u64,
    #[serde(default = "default_host_api_latency_ms")]
    pub host_api_latency_ms: u64,
    /// Media ids the simulated host reports as unavailable.
    #[serde(default)]
    pub unavailable_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    70
}

/// Accepts any integer and clamps it onto the 0..=100 scale.
fn deserialize_volume<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let volume = <i64 as serde::Deserialize>::deserialize(deserializer)?;
    Ok(volume.clamp(0, 100) as u8)
}

fn default_title_endpoint() -> String {
    "https://www.googleapis.com/youtube/v3/videos".to_string()
}

fn default_title_timeout_secs() -> u64 {
    5
}

fn default_track_duration_secs() -> u64 {
    30
}

fn default_load_latency_ms() -> u64 {
    150
}

fn default_host_api_latency_ms() -> u64 {
    200
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            sound_enabled: true,
        }
    }
}

impl Default for TitleLookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            endpoint: default_title_endpoint(),
            timeout_secs: default_title_timeout_secs(),
        }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            track_duration_secs: default_track_duration_secs(),
            load_latency_ms: default_load_latency_ms(),
            host_api_latency_ms: default_host_api_latency_ms(),
            unavailable_ids: Vec::new(),
        }
    }
}

impl TitleLookupConfig {
    /// API key from the environment when set, otherwise from the file.
    pub fn effective_api_key(&self) -> String {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.api_key.trim().to_string())
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        let configured = self.database_file.trim();
        if !configured.is_empty() {
            return PathBuf::from(configured);
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("focusjam")
            .join("focusjam.db")
    }
}

impl HeadlessConfig {
    pub fn track_duration(&self) -> Duration {
        Duration::from_secs(self.track_duration_secs)
    }

    pub fn load_latency(&self) -> Duration {
        Duration::from_millis(self.load_latency_ms)
    }

    pub fn host_api_latency(&self) -> Duration {
        Duration::from_millis(self.host_api_latency_ms)
    }
}

/// Clamps loaded values into supported ranges.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        player: PlayerConfig {
            volume: config.player.volume.min(100),
            sound_enabled: config.player.sound_enabled,
        },
        title_lookup: TitleLookupConfig {
            timeout_secs: config.title_lookup.timeout_secs.clamp(1, 60),
            ..config.title_lookup
        },
        storage: config.storage,
        headless: HeadlessConfig {
            track_duration_secs: config.headless.track_duration_secs.clamp(1, 3_600),
            load_latency_ms: config.headless.load_latency_ms.min(10_000),
            host_api_latency_ms: config.headless.host_api_latency_ms.min(10_000),
            unavailable_ids: config.headless.unavailable_ids,
        },
    }
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("focusjam")
        .join("config.toml")
}

/// Reads the config file, writing defaults first when it does not exist.
pub fn load_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create config directory {}: {}", parent.display(), err);
            }
        }
        match toml::to_string(&Config::default()) {
            Ok(text) => {
                if let Err(err) = std::fs::write(path, text) {
                    warn!("Failed to write default config {}: {}", path.display(), err);
                }
            }
            Err(err) => warn!("Failed to serialize default config: {}", err),
        }
    }

    let config = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<Config>(&content).unwrap_or_else(|err| {
            warn!(
                "Failed to parse config {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }),
        Err(err) => {
            warn!(
                "Failed to read config {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    };
    sanitize_config(config)
}
