//! Media-player entity.
//!
//! One player entity (key 10) backed by the two audio handles: media
//! playback runs on the TTS player, while PLAY/PAUSE/STOP transport
//! commands drive the background music player. An announcement play
//! pauses running music and resumes it when the playlist drains.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::PlaybackOutcome;
use crate::events::{CoreEvent, EventSender, PlaybackToken};
use crate::protocol::messages::{
    ApiMessage, ListEntitiesMediaPlayerResponse, MediaPlayerCommand, MediaPlayerCommandRequest,
    MediaPlayerState, MediaPlayerStateResponse,
};
use crate::state::ServerState;

pub const MEDIA_PLAYER_KEY: u32 = 10;

pub struct MediaPlayerEntity {
    key: u32,
    object_id: String,
    name: String,
    state: MediaPlayerState,
    volume: f32,
    muted: bool,
    playlist: VecDeque<String>,
    resume_music: bool,
    server: Arc<ServerState>,
    events: EventSender,
}

impl MediaPlayerEntity {
    pub fn new(server: Arc<ServerState>, events: EventSender) -> Self {
        Self {
            key: MEDIA_PLAYER_KEY,
            object_id: "satellite_media_player".to_string(),
            name: "Media Player".to_string(),
            state: MediaPlayerState::Idle,
            volume: 1.0,
            muted: false,
            playlist: VecDeque::new(),
            resume_music: false,
            server,
            events,
        }
    }

    pub fn definition(&self) -> ListEntitiesMediaPlayerResponse {
        ListEntitiesMediaPlayerResponse {
            object_id: self.object_id.clone(),
            key: self.key,
            name: self.name.clone(),
            unique_id: self.object_id.clone(),
            icon: String::new(),
            disabled_by_default: false,
            supports_pause: true,
        }
    }

    pub fn state_message(&self) -> MediaPlayerStateResponse {
        MediaPlayerStateResponse {
            key: self.key,
            state: self.state as i32,
            volume: self.volume,
            muted: self.muted,
        }
    }

    pub fn handle_command(&mut self, msg: &MediaPlayerCommandRequest) -> Vec<ApiMessage> {
        if msg.key != self.key {
            warn!(key = msg.key, "media player command for unknown key");
            return Vec::new();
        }

        if msg.has_media_url {
            let announcement = msg.has_announcement && msg.announcement;
            info!(url = %msg.media_url, announcement, "media play request");

            if announcement && self.server.music_player.is_playing() {
                self.server.music_player.pause();
                self.resume_music = true;
            }
            self.playlist = VecDeque::from([msg.media_url.clone()]);
            self.play_next();
            self.set_state(MediaPlayerState::Playing)
        } else if msg.has_command {
            match MediaPlayerCommand::try_from(msg.command) {
                Ok(MediaPlayerCommand::Pause) => {
                    self.server.music_player.pause();
                    self.set_state(MediaPlayerState::Paused)
                }
                Ok(MediaPlayerCommand::Play) => {
                    self.server.music_player.resume();
                    self.set_state(MediaPlayerState::Playing)
                }
                Ok(MediaPlayerCommand::Stop) => {
                    self.playlist.clear();
                    self.server.music_player.stop();
                    self.server.tts_player.stop();
                    self.set_state(MediaPlayerState::Idle)
                }
                Ok(MediaPlayerCommand::Mute) => {
                    self.muted = true;
                    self.emit_state()
                }
                Ok(MediaPlayerCommand::Unmute) => {
                    self.muted = false;
                    self.emit_state()
                }
                Err(_) => {
                    warn!(command = msg.command, "unknown media player command");
                    Vec::new()
                }
            }
        } else if msg.has_volume {
            let percent = (msg.volume.clamp(0.0, 1.0) * 100.0) as u8;
            self.server.music_player.set_volume(percent);
            self.server.tts_player.set_volume(percent);
            self.volume = msg.volume;
            self.emit_state()
        } else {
            Vec::new()
        }
    }

    /// One playlist item finished on the TTS player.
    pub fn handle_playback_done(&mut self, outcome: PlaybackOutcome) -> Vec<ApiMessage> {
        if outcome == PlaybackOutcome::Stopped {
            // Superseded by a newer play or stopped explicitly; the state
            // message for that transition was already sent.
            return Vec::new();
        }
        if let Some(next) = self.playlist.pop_front() {
            self.play_uri(&next);
            return Vec::new();
        }
        if self.resume_music {
            self.server.music_player.resume();
            self.resume_music = false;
        }
        self.set_state(MediaPlayerState::Idle)
    }

    fn play_next(&mut self) {
        if let Some(next) = self.playlist.pop_front() {
            self.play_uri(&next);
        }
    }

    fn play_uri(&self, uri: &str) {
        let tx = self.events.clone();
        self.server.tts_player.play(
            uri,
            Some(Box::new(move |outcome| {
                let _ = tx.send(CoreEvent::PlayerDone {
                    token: PlaybackToken::Media,
                    outcome,
                });
            })),
        );
    }

    fn set_state(&mut self, state: MediaPlayerState) -> Vec<ApiMessage> {
        self.state = state;
        self.emit_state()
    }

    fn emit_state(&self) -> Vec<ApiMessage> {
        vec![ApiMessage::MediaPlayerStateResponse(self.state_message())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOutput, DoneCallback};
    use crate::config::SatelliteConfig;
    use crate::events::core_channel;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingPlayer {
        plays: Mutex<Vec<String>>,
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        stops: AtomicUsize,
        volume: AtomicUsize,
        playing: AtomicBool,
    }

    impl AudioOutput for CountingPlayer {
        fn play(&self, uri: &str, _on_done: Option<DoneCallback>) {
            self.plays.lock().unwrap().push(uri.to_string());
            self.playing.store(true, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.playing.store(false, Ordering::SeqCst);
        }
        fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
        fn set_volume(&self, volume: u8) {
            self.volume.store(volume as usize, Ordering::SeqCst);
        }
        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    struct Fixture {
        entity: MediaPlayerEntity,
        music: Arc<CountingPlayer>,
        tts: Arc<CountingPlayer>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = SatelliteConfig {
            device_name: Some("test-dev".into()),
            preferences_path: Some(dir.path().join("preferences.json")),
            ..Default::default()
        };
        let music = Arc::new(CountingPlayer::default());
        let tts = Arc::new(CountingPlayer::default());
        let state = Arc::new(ServerState::new(
            &config,
            BTreeMap::new(),
            Arc::clone(&music) as Arc<dyn AudioOutput>,
            Arc::clone(&tts) as Arc<dyn AudioOutput>,
        ));
        let (events, _rx) = core_channel();
        Fixture {
            entity: MediaPlayerEntity::new(state, events),
            music,
            tts,
            _dir: dir,
        }
    }

    fn url_command(url: &str, announcement: bool) -> MediaPlayerCommandRequest {
        MediaPlayerCommandRequest {
            key: MEDIA_PLAYER_KEY,
            has_media_url: true,
            media_url: url.to_string(),
            has_announcement: announcement,
            announcement,
            ..Default::default()
        }
    }

    #[test]
    fn test_media_url_plays_and_reports_state() {
        let mut f = fixture();
        let msgs = f.entity.handle_command(&url_command("http://x/song.mp3", false));
        assert_eq!(f.tts.plays.lock().unwrap().as_slice(), ["http://x/song.mp3"]);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::MediaPlayerStateResponse(s)]
                if s.state == MediaPlayerState::Playing as i32
        ));
        // Music untouched without the announcement flag.
        assert_eq!(f.music.pauses.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_announcement_pauses_and_resumes_music() {
        let mut f = fixture();
        f.music.playing.store(true, Ordering::SeqCst);

        f.entity.handle_command(&url_command("http://x/announce.mp3", true));
        assert_eq!(f.music.pauses.load(Ordering::SeqCst), 1);

        let msgs = f.entity.handle_playback_done(PlaybackOutcome::Finished);
        assert_eq!(f.music.resumes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::MediaPlayerStateResponse(s)]
                if s.state == MediaPlayerState::Idle as i32
        ));
    }

    #[test]
    fn test_transport_commands() {
        let mut f = fixture();
        let pause = MediaPlayerCommandRequest {
            key: MEDIA_PLAYER_KEY,
            has_command: true,
            command: MediaPlayerCommand::Pause as i32,
            ..Default::default()
        };
        let msgs = f.entity.handle_command(&pause);
        assert_eq!(f.music.pauses.load(Ordering::SeqCst), 1);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::MediaPlayerStateResponse(s)]
                if s.state == MediaPlayerState::Paused as i32
        ));

        let stop = MediaPlayerCommandRequest {
            key: MEDIA_PLAYER_KEY,
            has_command: true,
            command: MediaPlayerCommand::Stop as i32,
            ..Default::default()
        };
        f.entity.handle_command(&stop);
        assert_eq!(f.music.stops.load(Ordering::SeqCst), 1);
        assert_eq!(f.tts.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_volume_applies_to_both_players() {
        let mut f = fixture();
        let cmd = MediaPlayerCommandRequest {
            key: MEDIA_PLAYER_KEY,
            has_volume: true,
            volume: 0.5,
            ..Default::default()
        };
        let msgs = f.entity.handle_command(&cmd);
        assert_eq!(f.music.volume.load(Ordering::SeqCst), 50);
        assert_eq!(f.tts.volume.load(Ordering::SeqCst), 50);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::MediaPlayerStateResponse(s)] if (s.volume - 0.5).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn test_mute_recorded_in_state() {
        let mut f = fixture();
        let cmd = MediaPlayerCommandRequest {
            key: MEDIA_PLAYER_KEY,
            has_command: true,
            command: MediaPlayerCommand::Mute as i32,
            ..Default::default()
        };
        let msgs = f.entity.handle_command(&cmd);
        assert!(matches!(
            msgs.as_slice(),
            [ApiMessage::MediaPlayerStateResponse(s)] if s.muted
        ));
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut f = fixture();
        let msgs = f.entity.handle_command(&MediaPlayerCommandRequest {
            key: 99,
            has_media_url: true,
            media_url: "http://x/other.mp3".into(),
            ..Default::default()
        });
        assert!(msgs.is_empty());
        assert!(f.tts.plays.lock().unwrap().is_empty());
    }
}
