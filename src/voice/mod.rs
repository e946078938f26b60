//! Voice assistant session state machine.
//!
//! Drives one wake → stream → intent → TTS cycle per run, plus the two
//! out-of-band flows: controller announcements (with optional follow-up
//! conversation) and the finished-timer ringing loop. Pipeline events
//! arrive from the controller; wake triggers, microphone chunks, and
//! playback completions arrive through the core event channel. Every
//! handler returns the list of messages to emit, and every branch
//! eventually returns the session to idle — nothing here is fatal.

pub mod phase;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::{AudioOutput, DoneCallback, MicSource, PlaybackOutcome};
use crate::events::{CoreEvent, EventSender, PlaybackToken};
use crate::protocol::messages::{
    ApiMessage, TimerEvent, VoiceAssistantAnnounceFinished, VoiceAssistantAnnounceRequest,
    VoiceAssistantAudio, VoiceAssistantConfigurationRequest, VoiceAssistantConfigurationResponse,
    VoiceAssistantEventResponse, VoiceAssistantExternalWakeWord, VoiceAssistantRequest,
    VoiceAssistantSetConfiguration, VoiceAssistantTimerEventResponse, VoiceAssistantWakeWord,
    VoiceEvent,
};
use crate::state::ServerState;
use crate::voice::phase::{PhaseTracker, VoicePhase};

/// Pause between timer-ring repetitions.
const RING_GAP: Duration = Duration::from_secs(1);

/// Lowers background music while speech output needs to be intelligible,
/// restores it afterwards. Pausing the music player is this
/// implementation's ducking; both directions are idempotent.
struct Ducker {
    music: Arc<dyn AudioOutput>,
    ducked: bool,
}

impl Ducker {
    fn new(music: Arc<dyn AudioOutput>) -> Self {
        Self {
            music,
            ducked: false,
        }
    }

    fn duck(&mut self) {
        if !self.ducked && self.music.is_playing() {
            debug!("ducking background audio");
            self.music.pause();
            self.ducked = true;
        }
    }

    fn unduck(&mut self) {
        if self.ducked {
            debug!("restoring background audio");
            self.music.resume();
            self.ducked = false;
        }
    }
}

/// Per-connection voice session. Torn down with the connection.
pub struct VoiceSession {
    state: Arc<ServerState>,
    mic: Arc<dyn MicSource>,
    events: EventSender,
    phase: PhaseTracker,
    is_streaming_audio: bool,
    /// TTS media for the current run; set on RUN_START, refreshed on
    /// TTS_END, cleared when the run resets.
    pending_tts_uri: Option<String>,
    tts_played: bool,
    continue_conversation: bool,
    timer_finished: bool,
    /// Remaining announcement items after the one currently playing.
    announce_queue: VecDeque<String>,
    /// Wake words the controller offered in its configuration request.
    external_wake_words: BTreeMap<String, VoiceAssistantExternalWakeWord>,
    ducker: Ducker,
}

impl VoiceSession {
    pub fn new(state: Arc<ServerState>, mic: Arc<dyn MicSource>, events: EventSender) -> Self {
        let ducker = Ducker::new(Arc::clone(&state.music_player));
        Self {
            state,
            mic,
            events,
            phase: PhaseTracker::new(),
            is_streaming_audio: false,
            pending_tts_uri: None,
            tts_played: false,
            continue_conversation: false,
            timer_finished: false,
            announce_queue: VecDeque::new(),
            external_wake_words: BTreeMap::new(),
            ducker,
        }
    }

    pub fn phase(&self) -> VoicePhase {
        self.phase.current()
    }

    pub fn is_streaming_audio(&self) -> bool {
        self.is_streaming_audio
    }

    pub fn timer_finished(&self) -> bool {
        self.timer_finished
    }

    // ------------------------------------------------------------------
    // Controller events
    // ------------------------------------------------------------------

    /// Pipeline event from the controller.
    pub fn handle_voice_event(&mut self, msg: &VoiceAssistantEventResponse) -> Vec<ApiMessage> {
        let Ok(event) = VoiceEvent::try_from(msg.event_type) else {
            debug!(event_type = msg.event_type, "unknown voice event");
            return Vec::new();
        };
        debug!(?event, "voice event");

        match event {
            VoiceEvent::RunStart => {
                self.pending_tts_uri = msg.data_value("url").map(String::from);
                self.tts_played = false;
                self.continue_conversation = false;
                Vec::new()
            }
            VoiceEvent::SttVadEnd | VoiceEvent::SttEnd => {
                self.stop_streaming();
                info!("speech capture finished");
                Vec::new()
            }
            VoiceEvent::IntentProgress => {
                if msg.data_value("tts_start_streaming") == Some("1") {
                    self.play_tts();
                }
                Vec::new()
            }
            VoiceEvent::IntentEnd => {
                if msg.data_value("continue_conversation") == Some("1") {
                    self.continue_conversation = true;
                }
                Vec::new()
            }
            VoiceEvent::TtsEnd => {
                if let Some(url) = msg.data_value("url") {
                    self.pending_tts_uri = Some(url.to_string());
                }
                self.play_tts();
                Vec::new()
            }
            VoiceEvent::RunEnd => {
                self.stop_streaming();
                // Safety net: a run that never produced audible TTS still
                // completes the announce handshake and unducks.
                let msgs = if !self.tts_played {
                    self.tts_finished()
                } else {
                    Vec::new()
                };
                self.tts_played = false;
                msgs
            }
            _ => Vec::new(),
        }
    }

    /// Controller-initiated announcement, optionally starting a
    /// conversation after playback.
    pub fn handle_announce(&mut self, msg: &VoiceAssistantAnnounceRequest) -> Vec<ApiMessage> {
        info!(text = %msg.text, "announcement received");

        let mut urls: VecDeque<String> = VecDeque::new();
        if !msg.preannounce_media_id.is_empty() {
            urls.push_back(msg.preannounce_media_id.clone());
        }
        if !msg.media_id.is_empty() {
            urls.push_back(msg.media_id.clone());
        }

        self.continue_conversation = msg.start_conversation;
        if let Some(stop) = self.state.stop_word.clone() {
            self.state.add_active_wake_word(&stop);
        }
        self.ducker.duck();

        let Some(first) = urls.pop_front() else {
            return self.tts_finished();
        };
        self.announce_queue = urls;
        self.phase.set(VoicePhase::PlayingTts);
        self.state
            .tts_player
            .play(&first, Some(self.done_callback(PlaybackToken::Announce)));
        Vec::new()
    }

    /// Timer event from the controller. Only TIMER_FINISHED is acted on.
    pub fn handle_timer_event(&mut self, msg: &VoiceAssistantTimerEventResponse) -> Vec<ApiMessage> {
        if !matches!(TimerEvent::try_from(msg.event_type), Ok(TimerEvent::Finished)) {
            return Vec::new();
        }
        if self.timer_finished {
            return Vec::new();
        }
        info!(name = %msg.name, "timer finished, ringing");

        if let Some(stop) = self.state.stop_word.clone() {
            self.state.add_active_wake_word(&stop);
        }
        self.timer_finished = true;
        self.ducker.duck();
        self.phase.set(VoicePhase::TimerRinging);
        self.play_timer_sound();
        Vec::new()
    }

    /// Report the wake-word configuration: own catalog plus the
    /// controller-supplied external models (micro only).
    pub fn handle_configuration_request(
        &mut self,
        msg: &VoiceAssistantConfigurationRequest,
    ) -> Vec<ApiMessage> {
        let mut available: Vec<VoiceAssistantWakeWord> = self
            .state
            .available_wake_words
            .values()
            .map(|w| VoiceAssistantWakeWord {
                id: w.id.clone(),
                wake_word: w.phrase.clone(),
                trained_languages: w.trained_languages.clone(),
            })
            .collect();

        for external in &msg.external_wake_words {
            if external.model_type != "micro" {
                continue;
            }
            available.push(VoiceAssistantWakeWord {
                id: external.id.clone(),
                wake_word: external.wake_word.clone(),
                trained_languages: external.trained_languages.clone(),
            });
            self.external_wake_words
                .insert(external.id.clone(), external.clone());
        }

        info!("voice assistant configured by controller");
        vec![ApiMessage::VoiceAssistantConfigurationResponse(
            VoiceAssistantConfigurationResponse {
                available_wake_words: available,
                active_wake_words: self.state.active_wake_words(),
                max_active_wake_words: self.state.max_active_wake_words as u32,
            },
        )]
    }

    /// Adopt the controller's active wake-word selection: filter to known
    /// ids, cap at the maximum, persist.
    pub fn handle_set_configuration(
        &mut self,
        msg: &VoiceAssistantSetConfiguration,
    ) -> Vec<ApiMessage> {
        let mut selected = std::collections::BTreeSet::new();
        for id in &msg.active_wake_words {
            if selected.len() >= self.state.max_active_wake_words {
                warn!(id = %id, "active wake word limit reached, dropping");
                continue;
            }
            if self.state.available_wake_words.contains_key(id)
                || self.external_wake_words.contains_key(id)
            {
                selected.insert(id.clone());
            } else {
                warn!(id = %id, "ignoring unknown wake word id");
            }
        }
        self.state.replace_active_wake_words(selected);
        Vec::new()
    }

    // ------------------------------------------------------------------
    // Local triggers (core event channel)
    // ------------------------------------------------------------------

    /// Wake-word engine matched an active model.
    pub fn wakeup(&mut self, phrase: &str) -> Vec<ApiMessage> {
        if self.timer_finished {
            // A ringing timer interprets any wake as "make it stop".
            self.timer_finished = false;
            self.state.tts_player.stop();
            debug!("timer ringing acknowledged by wake");
            return Vec::new();
        }

        info!(phrase = %phrase, "wake word triggered");
        let msgs = vec![ApiMessage::VoiceAssistantRequest(VoiceAssistantRequest {
            start: true,
            wake_word_phrase: phrase.to_string(),
            ..Default::default()
        })];

        self.ducker.duck();
        self.is_streaming_audio = true;
        self.phase.set(VoicePhase::Streaming);
        self.mic.start();

        if let Some(sound) = self.state.wakeup_sound_uri.clone() {
            self.state
                .tts_player
                .play(&sound, Some(self.done_callback(PlaybackToken::Wakeup)));
        }
        msgs
    }

    /// The stop word matched: cut whatever is playing.
    pub fn stop_triggered(&mut self) -> Vec<ApiMessage> {
        info!("stop word triggered");
        if let Some(stop) = self.state.stop_word.clone() {
            self.state.remove_active_wake_word(&stop);
        }
        if self.timer_finished {
            self.timer_finished = false;
        }
        // The in-flight playback's done callback drives the tts-finished
        // transition, so it runs exactly once.
        self.state.tts_player.stop();
        Vec::new()
    }

    /// Microphone chunk from the capture thread.
    pub fn handle_mic_chunk(&mut self, data: Vec<u8>) -> Vec<ApiMessage> {
        if !self.is_streaming_audio {
            return Vec::new();
        }
        vec![ApiMessage::VoiceAssistantAudio(VoiceAssistantAudio {
            data,
            end: false,
        })]
    }

    /// A playback run terminated.
    pub fn handle_player_done(
        &mut self,
        token: PlaybackToken,
        outcome: PlaybackOutcome,
    ) -> Vec<ApiMessage> {
        debug!(?token, ?outcome, "playback finished");
        match token {
            PlaybackToken::Wakeup | PlaybackToken::Media => Vec::new(),
            PlaybackToken::Tts => self.tts_finished(),
            PlaybackToken::Announce => {
                if outcome == PlaybackOutcome::Stopped {
                    // User cut the announcement; abandon the rest.
                    self.announce_queue.clear();
                    return self.tts_finished();
                }
                match self.announce_queue.pop_front() {
                    Some(next) => {
                        self.state
                            .tts_player
                            .play(&next, Some(self.done_callback(PlaybackToken::Announce)));
                        Vec::new()
                    }
                    None => self.tts_finished(),
                }
            }
            PlaybackToken::TimerRing => {
                if !self.timer_finished {
                    // Acknowledged between rings: loop exits, restore audio.
                    self.ducker.unduck();
                    self.phase.set(VoicePhase::Idle);
                    return Vec::new();
                }
                if outcome == PlaybackOutcome::Stopped {
                    return Vec::new();
                }
                let tx = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(RING_GAP).await;
                    let _ = tx.send(CoreEvent::TimerRingRepeat);
                });
                Vec::new()
            }
        }
    }

    /// The pause between timer rings elapsed.
    pub fn handle_timer_ring_repeat(&mut self) -> Vec<ApiMessage> {
        if self.timer_finished {
            self.play_timer_sound();
        } else {
            self.ducker.unduck();
            self.phase.set(VoicePhase::Idle);
        }
        Vec::new()
    }

    /// Connection lost: cancel the pending run and restore audio.
    pub fn reset(&mut self) {
        self.stop_streaming();
        self.pending_tts_uri = None;
        self.tts_played = false;
        self.continue_conversation = false;
        self.timer_finished = false;
        self.announce_queue.clear();
        self.ducker.unduck();
        self.phase.set(VoicePhase::Idle);
    }

    // ------------------------------------------------------------------
    // Internal transitions
    // ------------------------------------------------------------------

    fn stop_streaming(&mut self) {
        if self.is_streaming_audio {
            self.mic.stop();
            self.is_streaming_audio = false;
            if self.phase.current() == VoicePhase::Streaming {
                self.phase.set(VoicePhase::AwaitingTts);
            }
        }
    }

    /// Begin TTS playback once per run, as soon as a URI is known.
    fn play_tts(&mut self) {
        if self.tts_played {
            return;
        }
        let Some(uri) = self.pending_tts_uri.clone() else {
            return;
        };
        self.tts_played = true;
        info!(uri = %uri, "playing TTS response");

        if let Some(stop) = self.state.stop_word.clone() {
            self.state.add_active_wake_word(&stop);
        }
        self.phase.set(VoicePhase::PlayingTts);
        self.state
            .tts_player
            .play(&uri, Some(self.done_callback(PlaybackToken::Tts)));
    }

    /// Speech output is over: complete the handshake and either reopen
    /// the microphone for a follow-up or return to idle.
    fn tts_finished(&mut self) -> Vec<ApiMessage> {
        if let Some(stop) = self.state.stop_word.clone() {
            self.state.remove_active_wake_word(&stop);
        }

        let mut msgs = vec![ApiMessage::VoiceAssistantAnnounceFinished(
            VoiceAssistantAnnounceFinished { success: true },
        )];

        if self.continue_conversation {
            self.continue_conversation = false;
            debug!("continuing conversation");
            msgs.push(ApiMessage::VoiceAssistantRequest(VoiceAssistantRequest {
                start: true,
                ..Default::default()
            }));
            self.is_streaming_audio = true;
            self.phase.set(VoicePhase::Streaming);
            self.mic.start();
        } else {
            self.ducker.unduck();
            self.phase.set(VoicePhase::Idle);
        }
        msgs
    }

    fn play_timer_sound(&mut self) {
        let Some(uri) = self.state.timer_finished_sound_uri.clone() else {
            warn!("no timer sound configured, ringing silently");
            return;
        };
        self.state
            .tts_player
            .play(&uri, Some(self.done_callback(PlaybackToken::TimerRing)));
    }

    fn done_callback(&self, token: PlaybackToken) -> DoneCallback {
        let tx = self.events.clone();
        Box::new(move |outcome| {
            let _ = tx.send(CoreEvent::PlayerDone { token, outcome });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DoneCallback;
    use crate::config::SatelliteConfig;
    use crate::events::{core_channel, EventReceiver};
    use crate::protocol::messages::VoiceAssistantEventData;
    use crate::wake_word::{AvailableWakeWord, WakeWordKind};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Player fake mirroring the real contract: overlapping play cancels
    /// the previous run (its callback fires with Stopped), stop fires the
    /// in-flight callback.
    #[derive(Default)]
    struct FakePlayer {
        plays: Mutex<Vec<String>>,
        pending: Mutex<Vec<DoneCallback>>,
        stops: AtomicUsize,
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        playing: AtomicBool,
    }

    impl FakePlayer {
        fn plays(&self) -> Vec<String> {
            self.plays.lock().unwrap().clone()
        }

        /// Complete the current run as if playback drained naturally.
        fn finish(&self) {
            let cb = self.pending.lock().unwrap().pop();
            self.playing.store(false, Ordering::SeqCst);
            if let Some(cb) = cb {
                cb(PlaybackOutcome::Finished);
            }
        }
    }

    impl AudioOutput for FakePlayer {
        fn play(&self, uri: &str, on_done: Option<DoneCallback>) {
            for cb in self.pending.lock().unwrap().drain(..) {
                cb(PlaybackOutcome::Stopped);
            }
            self.plays.lock().unwrap().push(uri.to_string());
            if let Some(cb) = on_done {
                self.pending.lock().unwrap().push(cb);
            }
            self.playing.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.playing.store(false, Ordering::SeqCst);
            for cb in self.pending.lock().unwrap().drain(..) {
                cb(PlaybackOutcome::Stopped);
            }
        }

        fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }

        fn set_volume(&self, _volume: u8) {}

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeMic {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl MicSource for FakeMic {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        session: VoiceSession,
        tts: Arc<FakePlayer>,
        music: Arc<FakePlayer>,
        mic: Arc<FakeMic>,
        rx: EventReceiver,
        _prefs_dir: tempfile::TempDir,
    }

    fn catalog(ids: &[&str]) -> BTreeMap<String, AvailableWakeWord> {
        ids.iter()
            .map(|id| {
                (
                    id.to_string(),
                    AvailableWakeWord {
                        id: id.to_string(),
                        kind: WakeWordKind::Micro,
                        phrase: id.replace('_', " "),
                        trained_languages: vec!["en".into()],
                        model_path: PathBuf::from(format!("{id}.json")),
                    },
                )
            })
            .collect()
    }

    fn harness(ids: &[&str], wakeup_sound: Option<&str>) -> Harness {
        let prefs_dir = tempfile::tempdir().unwrap();
        let config = SatelliteConfig {
            device_name: Some("test-dev".into()),
            preferences_path: Some(prefs_dir.path().join("preferences.json")),
            wakeup_sound_uri: wakeup_sound.map(String::from),
            timer_finished_sound_uri: Some("timer_finished.flac".into()),
            ..Default::default()
        };
        let tts = Arc::new(FakePlayer::default());
        let music = Arc::new(FakePlayer::default());
        let state = Arc::new(ServerState::new(
            &config,
            catalog(ids),
            Arc::clone(&music) as Arc<dyn AudioOutput>,
            Arc::clone(&tts) as Arc<dyn AudioOutput>,
        ));
        let mic = Arc::new(FakeMic::default());
        let (tx, rx) = core_channel();
        let session = VoiceSession::new(state, Arc::clone(&mic) as Arc<dyn MicSource>, tx);
        Harness {
            session,
            tts,
            music,
            mic,
            rx,
            _prefs_dir: prefs_dir,
        }
    }

    /// Apply queued core events to the session, collecting emitted frames.
    fn pump(h: &mut Harness) -> Vec<ApiMessage> {
        let mut out = Vec::new();
        while let Ok(ev) = h.rx.try_recv() {
            match ev {
                CoreEvent::MicChunk(data) => out.extend(h.session.handle_mic_chunk(data)),
                CoreEvent::Wake { phrase, .. } => out.extend(h.session.wakeup(&phrase)),
                CoreEvent::PlayerDone { token, outcome } => {
                    out.extend(h.session.handle_player_done(token, outcome));
                }
                CoreEvent::TimerRingRepeat => out.extend(h.session.handle_timer_ring_repeat()),
            }
        }
        out
    }

    fn event(event: VoiceEvent, data: &[(&str, &str)]) -> VoiceAssistantEventResponse {
        VoiceAssistantEventResponse {
            event_type: event as i32,
            data: data
                .iter()
                .map(|(name, value)| VoiceAssistantEventData {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_wake_stream_tts_cycle() {
        let mut h = harness(&["okay_nabu"], None);

        // Wake: request goes out, mic opens, streaming phase.
        let msgs = h.session.wakeup("hey jarvis");
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            ApiMessage::VoiceAssistantRequest(req) => {
                assert!(req.start);
                assert_eq!(req.wake_word_phrase, "hey jarvis");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(h.session.is_streaming_audio());
        assert_eq!(h.session.phase(), VoicePhase::Streaming);
        assert_eq!(h.mic.starts.load(Ordering::SeqCst), 1);

        // Three mic chunks forward as three audio frames.
        for _ in 0..3 {
            let msgs = h.session.handle_mic_chunk(vec![0u8; 2048]);
            assert!(matches!(
                msgs.as_slice(),
                [ApiMessage::VoiceAssistantAudio(a)] if a.data.len() == 2048
            ));
        }

        // VAD end closes the mic.
        let msgs = h.session.handle_voice_event(&event(VoiceEvent::SttVadEnd, &[]));
        assert!(msgs.is_empty());
        assert!(!h.session.is_streaming_audio());
        assert_eq!(h.session.phase(), VoicePhase::AwaitingTts);
        assert_eq!(h.mic.stops.load(Ordering::SeqCst), 1);

        // TTS arrives and plays.
        h.session
            .handle_voice_event(&event(VoiceEvent::TtsEnd, &[("url", "http://x/a.mp3")]));
        assert_eq!(h.tts.plays(), vec!["http://x/a.mp3"]);
        assert_eq!(h.session.phase(), VoicePhase::PlayingTts);

        // Playback completes: announce-finished goes out, back to idle.
        h.tts.finish();
        let msgs = pump(&mut h);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::VoiceAssistantAnnounceFinished(_)]
        ));
        assert!(!h.session.is_streaming_audio());
        assert_eq!(h.session.phase(), VoicePhase::Idle);
    }

    #[tokio::test]
    async fn test_announce_with_start_conversation() {
        let mut h = harness(&["okay_nabu"], None);

        let msgs = h.session.handle_announce(&VoiceAssistantAnnounceRequest {
            media_id: "http://x/b.mp3".into(),
            text: "dinner".into(),
            preannounce_media_id: String::new(),
            start_conversation: true,
        });
        assert!(msgs.is_empty());
        assert_eq!(h.tts.plays(), vec!["http://x/b.mp3"]);

        h.tts.finish();
        let msgs = pump(&mut h);
        assert!(matches!(msgs[0], ApiMessage::VoiceAssistantAnnounceFinished(_)));
        assert!(matches!(
            &msgs[1],
            ApiMessage::VoiceAssistantRequest(req) if req.start && req.wake_word_phrase.is_empty()
        ));
        assert!(h.session.is_streaming_audio());
        assert_eq!(h.session.phase(), VoicePhase::Streaming);
        assert_eq!(h.mic.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_announce_plays_preannounce_first() {
        let mut h = harness(&["okay_nabu"], None);

        h.session.handle_announce(&VoiceAssistantAnnounceRequest {
            media_id: "http://x/main.mp3".into(),
            text: "hello".into(),
            preannounce_media_id: "http://x/chime.mp3".into(),
            start_conversation: false,
        });
        assert_eq!(h.tts.plays(), vec!["http://x/chime.mp3"]);

        h.tts.finish();
        let msgs = pump(&mut h);
        assert!(msgs.is_empty(), "no frames until the playlist drains");
        assert_eq!(
            h.tts.plays(),
            vec!["http://x/chime.mp3", "http://x/main.mp3"]
        );

        h.tts.finish();
        let msgs = pump(&mut h);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::VoiceAssistantAnnounceFinished(_)]
        ));
        assert_eq!(h.session.phase(), VoicePhase::Idle);
    }

    #[tokio::test]
    async fn test_empty_announce_finishes_immediately() {
        let mut h = harness(&["okay_nabu"], None);
        let msgs = h.session.handle_announce(&VoiceAssistantAnnounceRequest {
            media_id: String::new(),
            text: "nothing".into(),
            preannounce_media_id: String::new(),
            start_conversation: false,
        });
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::VoiceAssistantAnnounceFinished(_)]
        ));
        assert!(h.tts.plays().is_empty());
    }

    #[tokio::test]
    async fn test_timer_finished_stopped_by_wake() {
        let mut h = harness(&["okay_nabu", "stop"], None);

        h.session
            .handle_timer_event(&VoiceAssistantTimerEventResponse {
                event_type: TimerEvent::Finished as i32,
                ..Default::default()
            });
        assert!(h.session.timer_finished());
        assert_eq!(h.session.phase(), VoicePhase::TimerRinging);
        assert_eq!(h.tts.plays(), vec!["timer_finished.flac"]);
        // stop word armed while ringing
        assert!(h.session.state.is_wake_word_active("stop"));

        // First ring completes; the repeat is pending.
        h.tts.finish();
        pump(&mut h);

        // Wake during ringing only silences the timer.
        let msgs = h.session.wakeup("ok nabu");
        assert!(msgs.is_empty(), "no voice run starts from a ring-stop wake");
        assert!(!h.session.timer_finished());
        assert_eq!(h.tts.stops.load(Ordering::SeqCst), 1);

        // The scheduled repeat finds the flag cleared and exits the loop.
        let msgs = h.session.handle_timer_ring_repeat();
        assert!(msgs.is_empty());
        assert_eq!(h.session.phase(), VoicePhase::Idle);
        assert_eq!(h.tts.plays().len(), 1, "no second ring after acknowledge");
    }

    #[tokio::test]
    async fn test_duplicate_timer_finished_ignored() {
        let mut h = harness(&["okay_nabu"], None);
        let msg = VoiceAssistantTimerEventResponse {
            event_type: TimerEvent::Finished as i32,
            ..Default::default()
        };
        h.session.handle_timer_event(&msg);
        h.session.handle_timer_event(&msg);
        assert_eq!(h.tts.plays().len(), 1);
    }

    #[tokio::test]
    async fn test_run_end_without_tts_still_finishes() {
        let mut h = harness(&["okay_nabu"], None);
        h.session.wakeup("okay nabu");
        h.session.handle_voice_event(&event(VoiceEvent::RunStart, &[]));
        let msgs = h.session.handle_voice_event(&event(VoiceEvent::RunEnd, &[]));
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::VoiceAssistantAnnounceFinished(_)]
        ));
        assert_eq!(h.session.phase(), VoicePhase::Idle);
        assert!(!h.session.is_streaming_audio());
    }

    #[tokio::test]
    async fn test_intent_progress_streams_tts_early() {
        let mut h = harness(&["okay_nabu"], None);
        h.session
            .handle_voice_event(&event(VoiceEvent::RunStart, &[("url", "http://x/early.mp3")]));
        h.session.handle_voice_event(&event(
            VoiceEvent::IntentProgress,
            &[("tts_start_streaming", "1")],
        ));
        assert_eq!(h.tts.plays(), vec!["http://x/early.mp3"]);

        // TTS_END must not start a second playback of the same run.
        h.session
            .handle_voice_event(&event(VoiceEvent::TtsEnd, &[("url", "http://x/late.mp3")]));
        assert_eq!(h.tts.plays().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_word_cuts_tts() {
        let mut h = harness(&["okay_nabu", "stop"], None);
        h.session
            .handle_voice_event(&event(VoiceEvent::TtsEnd, &[("url", "http://x/a.mp3")]));
        assert!(h.session.state.is_wake_word_active("stop"));

        h.session.stop_triggered();
        // The stopped playback's callback drives exactly one transition.
        let msgs = pump(&mut h);
        assert_eq!(
            msgs.iter()
                .filter(|m| matches!(m, ApiMessage::VoiceAssistantAnnounceFinished(_)))
                .count(),
            1
        );
        assert!(!h.session.state.is_wake_word_active("stop"));
        assert_eq!(h.session.phase(), VoicePhase::Idle);
    }

    #[tokio::test]
    async fn test_ducking_pauses_and_resumes_music() {
        let mut h = harness(&["okay_nabu"], None);
        // Pretend music is playing.
        h.music.play("http://x/music.mp3", None);

        h.session.handle_announce(&VoiceAssistantAnnounceRequest {
            media_id: "http://x/say.mp3".into(),
            text: "hi".into(),
            preannounce_media_id: String::new(),
            start_conversation: false,
        });
        assert_eq!(h.music.pauses.load(Ordering::SeqCst), 1);

        h.tts.finish();
        pump(&mut h);
        assert_eq!(h.music.resumes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_configuration_filters_and_persists() {
        let mut h = harness(&["okay_nabu", "alexa", "jarvis"], None);
        h.session
            .handle_set_configuration(&VoiceAssistantSetConfiguration {
                active_wake_words: vec!["alexa".into(), "unknown_id".into()],
            });
        assert_eq!(h.session.state.active_wake_words(), vec!["alexa"]);
        assert!(h.session.state.wake_words_changed());
    }

    #[tokio::test]
    async fn test_set_configuration_caps_selection() {
        let mut h = harness(&["alexa", "jarvis", "okay_nabu"], None);
        h.session
            .handle_set_configuration(&VoiceAssistantSetConfiguration {
                active_wake_words: vec!["alexa".into(), "jarvis".into(), "okay_nabu".into()],
            });
        assert_eq!(h.session.state.active_wake_words().len(), 2);
    }

    #[tokio::test]
    async fn test_configuration_response_includes_external_micro_models() {
        let mut h = harness(&["okay_nabu"], None);
        let msgs = h
            .session
            .handle_configuration_request(&VoiceAssistantConfigurationRequest {
                external_wake_words: vec![
                    VoiceAssistantExternalWakeWord {
                        id: "hey_jarvis".into(),
                        wake_word: "hey jarvis".into(),
                        trained_languages: vec!["en".into()],
                        model_type: "micro".into(),
                        ..Default::default()
                    },
                    VoiceAssistantExternalWakeWord {
                        id: "big_model".into(),
                        wake_word: "big".into(),
                        model_type: "openWakeWord".into(),
                        ..Default::default()
                    },
                ],
            });
        let ApiMessage::VoiceAssistantConfigurationResponse(resp) = &msgs[0] else {
            panic!("expected configuration response");
        };
        let ids: Vec<&str> = resp
            .available_wake_words
            .iter()
            .map(|w| w.id.as_str())
            .collect();
        assert_eq!(ids, vec!["okay_nabu", "hey_jarvis"]);
        assert_eq!(resp.max_active_wake_words, 2);
        // External micro models become selectable.
        h.session
            .handle_set_configuration(&VoiceAssistantSetConfiguration {
                active_wake_words: vec!["hey_jarvis".into()],
            });
        assert_eq!(h.session.state.active_wake_words(), vec!["hey_jarvis"]);
    }

    #[tokio::test]
    async fn test_wakeup_sound_plays_on_wake() {
        let mut h = harness(&["okay_nabu"], Some("wake_chime.flac"));
        h.session.wakeup("okay nabu");
        assert_eq!(h.tts.plays(), vec!["wake_chime.flac"]);
        // Chime completion is a no-op.
        h.tts.finish();
        let msgs = pump(&mut h);
        assert!(msgs.is_empty());
        assert!(h.session.is_streaming_audio());
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let mut h = harness(&["okay_nabu"], None);
        h.session.wakeup("okay nabu");
        h.session
            .handle_voice_event(&event(VoiceEvent::TtsEnd, &[("url", "http://x/a.mp3")]));
        h.session.reset();
        assert!(!h.session.is_streaming_audio());
        assert_eq!(h.session.phase(), VoicePhase::Idle);
        assert!(!h.session.timer_finished());
        assert_eq!(h.mic.stops.load(Ordering::SeqCst), 1);
    }
}
