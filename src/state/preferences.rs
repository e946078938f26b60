//! Persisted user selections.
//!
//! One small JSON document. Writes go through a temp file and rename so a
//! crash mid-write never corrupts the previous preferences; read failures
//! of any kind degrade to the empty default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::read_json_file;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub active_wake_words: Vec<String>,
}

impl Preferences {
    /// Load from disk. Missing file or parse failure yields the default.
    pub fn load(path: &Path) -> Self {
        read_json_file(path).unwrap_or_default()
    }

    /// Persist atomically. Failure is logged, never propagated.
    pub fn save(&self, path: &Path) {
        debug!("saving preferences to {}", path.display());
        if let Err(e) = self.try_save(path) {
            warn!("failed to save preferences: {e}");
        }
    }

    fn try_save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let prefs = Preferences {
            active_wake_words: vec!["alexa".into(), "okay_nabu".into()],
        };
        prefs.save(&path);
        assert_eq!(Preferences::load(&path), prefs);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("absent.json"));
        assert!(prefs.active_wake_words.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "][").unwrap();
        let prefs = Preferences::load(&path);
        assert!(prefs.active_wake_words.is_empty());
    }
}
