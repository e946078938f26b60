//! Per-connection protocol state machine.
//!
//! Owns the frame decoder, the session-phase handshake, and the dispatch
//! table from inbound messages to the voice session and the entity
//! bridge. All responses produced for one inbound read are returned as a
//! single byte batch so the caller writes them with one syscall.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entities::{EntityBridge, EntityHandlers};
use crate::events::{CoreEvent, EventSender, PlaybackToken};
use crate::protocol::frame::{encode_frame, FrameDecoder, FrameError};
use crate::protocol::messages::{
    ApiMessage, AuthenticationResponse, DeviceInfoResponse, DisconnectResponse, HelloResponse,
    PingResponse, SATELLITE_FEATURES,
};
use crate::state::ServerState;
use crate::voice::VoiceSession;

/// API version reported in HelloResponse.
const API_VERSION_MAJOR: u32 = 1;
const API_VERSION_MINOR: u32 = 10;

/// Where the connection is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitHello,
    AwaitAuth,
    Ready,
    Closing,
}

pub struct ConnectionSession {
    state: Arc<ServerState>,
    phase: SessionPhase,
    decoder: FrameDecoder,
    voice: VoiceSession,
    bridge: EntityBridge,
}

impl ConnectionSession {
    pub fn new(
        state: Arc<ServerState>,
        handlers: Arc<EntityHandlers>,
        mic: Arc<dyn crate::audio::MicSource>,
        events: EventSender,
    ) -> Self {
        let voice = VoiceSession::new(Arc::clone(&state), mic, events.clone());
        let bridge = EntityBridge::new(handlers, Arc::clone(&state), events);
        Self {
            state,
            phase: SessionPhase::AwaitHello,
            decoder: FrameDecoder::new(),
            voice,
            bridge,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_closing(&self) -> bool {
        self.phase == SessionPhase::Closing
    }

    pub fn voice(&self) -> &VoiceSession {
        &self.voice
    }

    /// Feed bytes from the socket. Returns the batched response bytes;
    /// a framing error is fatal for the connection.
    pub fn handle_data(&mut self, data: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.decoder.extend(data);
        let mut replies = Vec::new();

        loop {
            let frame = match self.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("framing violation: {e}");
                    return Err(e);
                }
            };

            match ApiMessage::decode(frame.msg_type, &frame.payload) {
                Ok(Some(msg)) => replies.extend(self.handle_message(msg)),
                Ok(None) => debug!(msg_type = frame.msg_type, "ignoring unknown message type"),
                Err(e) => {
                    warn!(msg_type = frame.msg_type, "undecodable payload: {e}");
                }
            }
        }

        Ok(encode_batch(&replies))
    }

    /// Apply one core event (mic chunk, wake, playback completion).
    pub fn handle_event(&mut self, event: CoreEvent) -> Vec<u8> {
        let msgs = match event {
            CoreEvent::MicChunk(data) => self.voice.handle_mic_chunk(data),
            CoreEvent::Wake { id, phrase } => {
                if self.state.stop_word.as_deref() == Some(id.as_str()) {
                    self.voice.stop_triggered()
                } else {
                    self.voice.wakeup(&phrase)
                }
            }
            CoreEvent::PlayerDone {
                token: PlaybackToken::Media,
                outcome,
            } => self.bridge.handle_media_done(outcome),
            CoreEvent::PlayerDone { token, outcome } => {
                self.voice.handle_player_done(token, outcome)
            }
            CoreEvent::TimerRingRepeat => self.voice.handle_timer_ring_repeat(),
        };
        encode_batch(&msgs)
    }

    /// Connection teardown: cancel any pending voice run.
    pub fn on_disconnect(&mut self) {
        info!("controller disconnected");
        self.voice.reset();
        self.phase = SessionPhase::Closing;
    }

    /// Dispatch one decoded message, returning the replies to emit.
    pub fn handle_message(&mut self, msg: ApiMessage) -> Vec<ApiMessage> {
        // Liveness and disconnect work in every phase.
        match &msg {
            ApiMessage::PingRequest(_) => {
                return vec![ApiMessage::PingResponse(PingResponse {})];
            }
            ApiMessage::DisconnectRequest(_) => {
                self.phase = SessionPhase::Closing;
                return vec![ApiMessage::DisconnectResponse(DisconnectResponse {})];
            }
            _ => {}
        }

        match self.phase {
            SessionPhase::AwaitHello => match msg {
                ApiMessage::HelloRequest(hello) => {
                    info!(
                        client = %hello.client_info,
                        api_major = hello.api_version_major,
                        api_minor = hello.api_version_minor,
                        "controller hello",
                    );
                    self.phase = SessionPhase::AwaitAuth;
                    vec![ApiMessage::HelloResponse(HelloResponse {
                        api_version_major: API_VERSION_MAJOR,
                        api_version_minor: API_VERSION_MINOR,
                        server_info: format!("voice-satellite {}", env!("CARGO_PKG_VERSION")),
                        name: self.state.device_name.clone(),
                    })]
                }
                other => {
                    debug!(?other, "message before hello ignored");
                    Vec::new()
                }
            },
            SessionPhase::AwaitAuth => match msg {
                ApiMessage::AuthenticationRequest(_) => {
                    // No password challenge: authentication is accepted.
                    info!("controller authenticated");
                    self.phase = SessionPhase::Ready;
                    vec![ApiMessage::AuthenticationResponse(AuthenticationResponse {
                        invalid_password: false,
                    })]
                }
                other => {
                    debug!(?other, "message before authentication ignored");
                    Vec::new()
                }
            },
            SessionPhase::Ready => self.handle_ready_message(msg),
            SessionPhase::Closing => Vec::new(),
        }
    }

    fn handle_ready_message(&mut self, msg: ApiMessage) -> Vec<ApiMessage> {
        match msg {
            ApiMessage::DeviceInfoRequest(_) => {
                vec![ApiMessage::DeviceInfoResponse(DeviceInfoResponse {
                    uses_password: false,
                    name: self.state.device_name.clone(),
                    mac_address: self.state.mac_address.clone(),
                    esphome_version: env!("CARGO_PKG_VERSION").to_string(),
                    friendly_name: self.state.device_name.clone(),
                    project_name: "voice_satellite.desktop".to_string(),
                    project_version: env!("CARGO_PKG_VERSION").to_string(),
                    voice_assistant_feature_flags: SATELLITE_FEATURES,
                    ..Default::default()
                })]
            }
            ApiMessage::ListEntitiesRequest(_) => self.bridge.list_entities(),
            ApiMessage::SubscribeHomeAssistantStatesRequest(_) => self.bridge.subscribe_states(),
            ApiMessage::VoiceAssistantConfigurationRequest(m) => {
                self.voice.handle_configuration_request(&m)
            }
            ApiMessage::VoiceAssistantSetConfiguration(m) => {
                self.voice.handle_set_configuration(&m)
            }
            ApiMessage::VoiceAssistantEventResponse(m) => self.voice.handle_voice_event(&m),
            ApiMessage::VoiceAssistantAnnounceRequest(m) => self.voice.handle_announce(&m),
            ApiMessage::VoiceAssistantTimerEventResponse(m) => self.voice.handle_timer_event(&m),
            ApiMessage::MediaPlayerCommandRequest(m) => self.bridge.handle_media_player(&m),
            ApiMessage::ButtonCommandRequest(m) => self.bridge.handle_button(&m),
            ApiMessage::ExecuteServiceRequest(m) => self.bridge.handle_service(&m),
            other => {
                debug!(?other, "unhandled message in ready phase");
                Vec::new()
            }
        }
    }
}

/// Frame every message into one contiguous write buffer.
pub fn encode_batch(msgs: &[ApiMessage]) -> Vec<u8> {
    let mut out = Vec::new();
    for msg in msgs {
        encode_frame(&mut out, msg.wire_type(), &msg.encode_payload());
    }
    out
}
