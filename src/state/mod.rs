//! Process-wide server state.
//!
//! One `ServerState` lives for the process lifetime and aggregates the
//! wake-word catalog, the active selection, both audio players, and the
//! persisted preferences. Connection sessions borrow it through an `Arc`;
//! the state never owns anything session-scoped.

pub mod preferences;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::audio::AudioOutput;
use crate::config::SatelliteConfig;
use crate::state::preferences::Preferences;
use crate::wake_word::{self, AvailableWakeWord, STOP_WORD_ID};

pub struct ServerState {
    pub device_name: String,
    /// Colon-separated hex, stable across restarts.
    pub mac_address: String,
    /// Immutable after startup.
    pub available_wake_words: BTreeMap<String, AvailableWakeWord>,
    /// Read by the wake-word engine thread, written by the session.
    active_wake_words: Mutex<BTreeSet<String>>,
    /// Model reserved for "stop current playback", if the catalog has one.
    pub stop_word: Option<String>,
    pub music_player: Arc<dyn AudioOutput>,
    pub tts_player: Arc<dyn AudioOutput>,
    pub wakeup_sound_uri: Option<String>,
    pub timer_finished_sound_uri: Option<String>,
    preferences: Mutex<Preferences>,
    pub preferences_path: PathBuf,
    pub max_active_wake_words: usize,
    /// Minimum gap between wake triggers, for the engine's use.
    pub refractory_seconds: f64,
    wake_words_changed: AtomicBool,
    satellite_connected: AtomicBool,
}

impl ServerState {
    pub fn new(
        config: &SatelliteConfig,
        available_wake_words: BTreeMap<String, AvailableWakeWord>,
        music_player: Arc<dyn AudioOutput>,
        tts_player: Arc<dyn AudioOutput>,
    ) -> Self {
        let device_name = config.resolved_device_name();
        let mac_address = derive_mac(&device_name);
        let preferences_path = config.resolved_preferences_path();

        let stop_word = available_wake_words
            .contains_key(STOP_WORD_ID)
            .then(|| STOP_WORD_ID.to_string());

        // Default selection, then let saved preferences win where they
        // still name available models.
        let mut active: BTreeSet<String> =
            wake_word::default_active(&available_wake_words).into_iter().collect();

        let preferences = Preferences::load(&preferences_path);
        let saved: BTreeSet<String> = preferences
            .active_wake_words
            .iter()
            .filter(|id| available_wake_words.contains_key(*id))
            .cloned()
            .collect();
        if !saved.is_empty() {
            info!(?saved, "restored wake word selection from preferences");
            active = saved;
        }
        while active.len() > config.max_active_wake_words {
            let last = active.iter().next_back().cloned();
            if let Some(last) = last {
                active.remove(&last);
            }
        }

        Self {
            device_name,
            mac_address,
            available_wake_words,
            active_wake_words: Mutex::new(active),
            stop_word,
            music_player,
            tts_player,
            wakeup_sound_uri: config.wakeup_sound_uri.clone(),
            timer_finished_sound_uri: config.timer_finished_sound_uri.clone(),
            preferences: Mutex::new(preferences),
            preferences_path,
            max_active_wake_words: config.max_active_wake_words,
            refractory_seconds: config.refractory_seconds,
            wake_words_changed: AtomicBool::new(false),
            satellite_connected: AtomicBool::new(false),
        }
    }

    /// Snapshot of the active selection.
    pub fn active_wake_words(&self) -> Vec<String> {
        self.active_wake_words
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_wake_word_active(&self, id: &str) -> bool {
        self.active_wake_words.lock().unwrap().contains(id)
    }

    /// Temporary FSM injection (stop word during playback / ringing).
    pub fn add_active_wake_word(&self, id: &str) {
        self.active_wake_words.lock().unwrap().insert(id.to_string());
    }

    pub fn remove_active_wake_word(&self, id: &str) {
        self.active_wake_words.lock().unwrap().remove(id);
    }

    /// Adopt a new configured selection, persist it, and flag the engine.
    /// The caller has already filtered to known ids and applied the cap.
    pub fn replace_active_wake_words(&self, ids: BTreeSet<String>) {
        info!(?ids, "active wake words updated");
        {
            let mut prefs = self.preferences.lock().unwrap();
            prefs.active_wake_words = ids.iter().cloned().collect();
            prefs.save(&self.preferences_path);
        }
        *self.active_wake_words.lock().unwrap() = ids;
        self.wake_words_changed.store(true, Ordering::Release);
    }

    /// Consume the dirty flag (wake-word engine side).
    pub fn take_wake_words_changed(&self) -> bool {
        self.wake_words_changed.swap(false, Ordering::AcqRel)
    }

    pub fn wake_words_changed(&self) -> bool {
        self.wake_words_changed.load(Ordering::Acquire)
    }

    pub fn preferences_snapshot(&self) -> Preferences {
        self.preferences.lock().unwrap().clone()
    }

    /// Back-reference flag for "a controller session currently exists".
    pub fn set_connected(&self, connected: bool) {
        self.satellite_connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.satellite_connected.load(Ordering::Acquire)
    }
}

/// Derive a stable MAC-shaped identifier from the device name: first six
/// hash bytes with the locally-administered bit set and multicast cleared.
fn derive_mac(device_name: &str) -> String {
    let digest = Sha256::digest(device_name.as_bytes());
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&digest[..6]);
    mac[0] = (mac[0] | 0x02) & 0xfe;
    mac.map(|b| format!("{b:02x}")).join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{DoneCallback, PlaybackOutcome};

    /// Player fake that completes every play immediately.
    pub struct ImmediatePlayer;

    impl AudioOutput for ImmediatePlayer {
        fn play(&self, _uri: &str, on_done: Option<DoneCallback>) {
            if let Some(cb) = on_done {
                cb(PlaybackOutcome::Finished);
            }
        }
        fn stop(&self) {}
        fn pause(&self) {}
        fn resume(&self) {}
        fn set_volume(&self, _volume: u8) {}
        fn is_playing(&self) -> bool {
            false
        }
    }

    fn catalog(ids: &[&str]) -> BTreeMap<String, AvailableWakeWord> {
        ids.iter()
            .map(|id| {
                (
                    id.to_string(),
                    AvailableWakeWord {
                        id: id.to_string(),
                        kind: crate::wake_word::WakeWordKind::Micro,
                        phrase: id.replace('_', " "),
                        trained_languages: vec!["en".into()],
                        model_path: PathBuf::from(format!("{id}.json")),
                    },
                )
            })
            .collect()
    }

    fn state_with(ids: &[&str], prefs_dir: &std::path::Path) -> ServerState {
        let config = SatelliteConfig {
            device_name: Some("test-dev".into()),
            preferences_path: Some(prefs_dir.join("preferences.json")),
            ..Default::default()
        };
        ServerState::new(
            &config,
            catalog(ids),
            Arc::new(ImmediatePlayer),
            Arc::new(ImmediatePlayer),
        )
    }

    #[test]
    fn test_mac_is_stable_and_unicast() {
        let a = derive_mac("test-dev");
        let b = derive_mac("test-dev");
        assert_eq!(a, b);
        assert_eq!(a.len(), 17);
        let first = u8::from_str_radix(&a[..2], 16).unwrap();
        assert_eq!(first & 0x01, 0, "multicast bit must be clear");
        assert_eq!(first & 0x02, 0x02, "locally administered bit must be set");
        assert_ne!(derive_mac("other-dev"), a);
    }

    #[test]
    fn test_default_active_prefers_okay_nabu() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&["alexa", "okay_nabu"], dir.path());
        assert_eq!(state.active_wake_words(), vec!["okay_nabu"]);
    }

    #[test]
    fn test_stop_word_reserved_not_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&["stop", "zz_word"], dir.path());
        assert_eq!(state.stop_word.as_deref(), Some("stop"));
        assert_eq!(state.active_wake_words(), vec!["zz_word"]);
    }

    #[test]
    fn test_saved_preferences_win_when_valid() {
        let dir = tempfile::tempdir().unwrap();
        Preferences {
            active_wake_words: vec!["alexa".into(), "gone_model".into()],
        }
        .save(&dir.path().join("preferences.json"));

        let state = state_with(&["alexa", "okay_nabu"], dir.path());
        assert_eq!(state.active_wake_words(), vec!["alexa"]);
    }

    #[test]
    fn test_replace_persists_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&["alexa", "jarvis", "okay_nabu"], dir.path());
        assert!(!state.wake_words_changed());

        state.replace_active_wake_words(["alexa".to_string()].into_iter().collect());
        assert_eq!(state.active_wake_words(), vec!["alexa"]);
        assert!(state.wake_words_changed());
        assert!(state.take_wake_words_changed());
        assert!(!state.wake_words_changed());

        let reloaded = Preferences::load(&state.preferences_path);
        assert_eq!(reloaded.active_wake_words, vec!["alexa"]);
    }

    #[test]
    fn test_temporary_injection() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(&["okay_nabu", "stop"], dir.path());
        state.add_active_wake_word("stop");
        assert!(state.is_wake_word_active("stop"));
        state.remove_active_wake_word("stop");
        assert!(!state.is_wake_word_active("stop"));
        // injection is not a configured selection
        assert!(!state.wake_words_changed());
    }
}
