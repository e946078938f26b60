//! Platform data directory.

use std::path::PathBuf;

/// Base directory for settings, preferences, wake-word models, and logs.
///
/// Resolves to the platform config dir (`%APPDATA%`, `~/Library/Application
/// Support`, `$XDG_CONFIG_HOME`) joined with the app name.
pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voice-satellite")
}
