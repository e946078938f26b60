//! Configuration surface.
//!
//! `satellite.json` in the data directory, every field optional. Missing
//! file or unparsable content falls back to defaults; the satellite should
//! come up zero-config.

pub mod paths;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::data_dir;

pub const DEFAULT_API_PORT: u16 = 6053;

/// Runtime settings, resolved against defaults at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteConfig {
    /// Name advertised over mDNS and reported in DeviceInfo.
    /// Defaults to the host name.
    pub device_name: Option<String>,
    pub api_port: u16,
    pub api_bind_address: String,
    pub preferences_path: Option<PathBuf>,
    pub wake_word_dir: Option<PathBuf>,
    /// Chime played when a wake word triggers.
    pub wakeup_sound_uri: Option<String>,
    /// Sound looped while a finished timer rings.
    pub timer_finished_sound_uri: Option<String>,
    pub max_active_wake_words: usize,
    /// Minimum gap between wake triggers. Stored for the wake-word engine;
    /// the session FSM does not consult it.
    pub refractory_seconds: f64,
    /// Named capture device; default input when unset.
    pub microphone_device: Option<String>,
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            api_port: DEFAULT_API_PORT,
            api_bind_address: "0.0.0.0".to_string(),
            preferences_path: None,
            wake_word_dir: None,
            wakeup_sound_uri: None,
            timer_finished_sound_uri: None,
            max_active_wake_words: 2,
            refractory_seconds: 2.0,
            microphone_device: None,
        }
    }
}

impl SatelliteConfig {
    /// Device name with the hostname fallback applied.
    pub fn resolved_device_name(&self) -> String {
        self.device_name.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .map(|h| h.split('.').next().unwrap_or(&h).to_string())
                .unwrap_or_else(|| "voice-satellite".to_string())
        })
    }

    pub fn resolved_preferences_path(&self) -> PathBuf {
        self.preferences_path
            .clone()
            .unwrap_or_else(|| data_dir().join("preferences.json"))
    }

    pub fn resolved_wake_word_dir(&self) -> PathBuf {
        self.wake_word_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("wakewords"))
    }
}

/// Path to satellite.json.
pub fn config_path() -> PathBuf {
    data_dir().join("satellite.json")
}

/// Read the settings file, falling back to defaults.
pub fn read_config() -> SatelliteConfig {
    read_json_file(&config_path()).unwrap_or_default()
}

/// Generic helper: read a JSON file and deserialize it leniently.
pub(crate) fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
