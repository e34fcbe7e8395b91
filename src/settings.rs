//! Settings file handling plus environment overrides.
//!
//! Settings live in a JSON file under the platform config directory.
//! Unknown or missing fields fall back to defaults so old files keep
//! working across upgrades.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// WebSocket endpoint of the transcription backend.
    pub endpoint: String,

    /// Target capture sample rate in Hz. Governs the encoded PCM
    /// regardless of what rate the input device grants.
    pub sample_rate: u32,

    /// Requested capture channel count. Multi-channel input is
    /// downmixed to mono before encoding.
    pub channel_count: u16,

    /// Fixed delay between a connection close and the next attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            sample_rate: 16_000,
            channel_count: 1,
            reconnect_delay_ms: 2000,
        }
    }
}

impl Settings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Apply `VOXSTREAM_*` environment overrides on top of whatever the
    /// settings file provided. Unparseable values are ignored with a
    /// warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("VOXSTREAM_ENDPOINT") {
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }
        if let Ok(raw) = std::env::var("VOXSTREAM_SAMPLE_RATE") {
            match raw.parse() {
                Ok(rate) => self.sample_rate = rate,
                Err(_) => log::warn!("Ignoring invalid VOXSTREAM_SAMPLE_RATE: {}", raw),
            }
        }
        if let Ok(raw) = std::env::var("VOXSTREAM_RECONNECT_DELAY_MS") {
            match raw.parse() {
                Ok(ms) => self.reconnect_delay_ms = ms,
                Err(_) => log::warn!("Ignoring invalid VOXSTREAM_RECONNECT_DELAY_MS: {}", raw),
            }
        }
    }
}

/// Default settings path under the platform config directory, or
/// `None` when no config directory can be determined.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("voxstream").join(SETTINGS_FILE_NAME))
}

/// Load settings, falling back to defaults when the file is absent or
/// unreadable. A parse failure is logged rather than fatal.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = match path {
        Some(p) => p,
        None => {
            log::warn!("Settings: could not determine config directory, using defaults");
            return Settings::default();
        }
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Persist settings atomically: write a temp file in the same
/// directory, then rename over the destination.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Serialize settings: {}", e))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename atomically replaces the destination. On Windows,
    // rename fails if the destination exists, so remove it first.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))
}
