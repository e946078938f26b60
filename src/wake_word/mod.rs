//! Wake-word catalog.
//!
//! Scans a directory of per-model JSON descriptors at startup. The file
//! stem is the model id; the descriptor carries the spoken phrase, the
//! trained languages, and the engine kind. The catalog is immutable after
//! load; the detection engine itself is an external collaborator that
//! reads `active_wake_words` and posts wake events to the core channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Model id activated by default when present in the catalog.
pub const PREFERRED_DEFAULT: &str = "okay_nabu";

/// Model id reserved for "stop current playback" when present.
pub const STOP_WORD_ID: &str = "stop";

/// Wake-word engine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeWordKind {
    Micro,
    Open,
}

/// One loadable wake-word model.
#[derive(Debug, Clone)]
pub struct AvailableWakeWord {
    pub id: String,
    pub kind: WakeWordKind,
    /// The spoken phrase, e.g. "okay nabu".
    pub phrase: String,
    pub trained_languages: Vec<String>,
    pub model_path: PathBuf,
}

/// On-disk descriptor shape (one JSON file per model).
#[derive(Debug, Deserialize)]
struct Descriptor {
    wake_word: Option<String>,
    #[serde(default = "default_languages")]
    trained_languages: Vec<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

/// Load every model descriptor under `dir`. A bad descriptor skips that
/// model; a missing directory yields an empty catalog.
pub fn load_catalog(dir: &Path) -> BTreeMap<String, AvailableWakeWord> {
    let mut catalog = BTreeMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("wake word directory {} unavailable: {}", dir.display(), e);
            return catalog;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };

        let descriptor: Descriptor = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
        {
            Ok(d) => d,
            Err(e) => {
                warn!("skipping wake word descriptor {}: {}", path.display(), e);
                continue;
            }
        };

        let kind = match descriptor.kind.as_deref() {
            Some("micro") | None => WakeWordKind::Micro,
            _ => WakeWordKind::Open,
        };
        let phrase = descriptor.wake_word.unwrap_or_else(|| id.clone());
        debug!(id = %id, phrase = %phrase, "loaded wake word");

        catalog.insert(
            id.clone(),
            AvailableWakeWord {
                id,
                kind,
                phrase,
                trained_languages: descriptor.trained_languages,
                model_path: path,
            },
        );
    }

    info!("loaded {} wake word models", catalog.len());
    catalog
}

/// Pick the default active model: the preferred id when present, else the
/// first by enumeration order, skipping the reserved stop word.
pub fn default_active(catalog: &BTreeMap<String, AvailableWakeWord>) -> Option<String> {
    if catalog.contains_key(PREFERRED_DEFAULT) {
        return Some(PREFERRED_DEFAULT.to_string());
    }
    catalog.keys().find(|id| *id != STOP_WORD_ID).cloned()
}
