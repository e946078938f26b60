//! Typed message set for the ESPHome Native API.
//!
//! Each message is declared with the upstream `api.proto` field tags and
//! paired with its stable wire type number in [`ApiMessage`]. Only the
//! subset a voice satellite speaks is declared; unknown inbound types are
//! reported as `None` by [`ApiMessage::decode`] and ignored by the caller.
//!
//! Entity `key` fields are protobuf `fixed32`, matching upstream.

use prost::Message;

// ---------------------------------------------------------------------------
// Wire type numbers (stable, defined by the ESPHome Native API)
// ---------------------------------------------------------------------------

pub mod wire {
    pub const HELLO_REQUEST: u32 = 1;
    pub const HELLO_RESPONSE: u32 = 2;
    pub const AUTHENTICATION_REQUEST: u32 = 3;
    pub const AUTHENTICATION_RESPONSE: u32 = 4;
    pub const DISCONNECT_REQUEST: u32 = 5;
    pub const DISCONNECT_RESPONSE: u32 = 6;
    pub const PING_REQUEST: u32 = 7;
    pub const PING_RESPONSE: u32 = 8;
    pub const DEVICE_INFO_REQUEST: u32 = 9;
    pub const DEVICE_INFO_RESPONSE: u32 = 10;
    pub const LIST_ENTITIES_REQUEST: u32 = 11;
    pub const LIST_ENTITIES_SENSOR_RESPONSE: u32 = 16;
    pub const LIST_ENTITIES_DONE_RESPONSE: u32 = 19;
    pub const SENSOR_STATE_RESPONSE: u32 = 25;
    pub const SUBSCRIBE_HOME_ASSISTANT_STATES_REQUEST: u32 = 38;
    pub const LIST_ENTITIES_SERVICES_RESPONSE: u32 = 41;
    pub const EXECUTE_SERVICE_REQUEST: u32 = 42;
    pub const LIST_ENTITIES_BUTTON_RESPONSE: u32 = 61;
    pub const BUTTON_COMMAND_REQUEST: u32 = 62;
    pub const LIST_ENTITIES_MEDIA_PLAYER_RESPONSE: u32 = 63;
    pub const MEDIA_PLAYER_STATE_RESPONSE: u32 = 64;
    pub const MEDIA_PLAYER_COMMAND_REQUEST: u32 = 65;
    pub const VOICE_ASSISTANT_REQUEST: u32 = 90;
    pub const VOICE_ASSISTANT_EVENT_RESPONSE: u32 = 92;
    pub const VOICE_ASSISTANT_AUDIO: u32 = 106;
    pub const VOICE_ASSISTANT_TIMER_EVENT_RESPONSE: u32 = 115;
    pub const VOICE_ASSISTANT_ANNOUNCE_REQUEST: u32 = 119;
    pub const VOICE_ASSISTANT_ANNOUNCE_FINISHED: u32 = 120;
    pub const VOICE_ASSISTANT_CONFIGURATION_REQUEST: u32 = 121;
    pub const VOICE_ASSISTANT_CONFIGURATION_RESPONSE: u32 = 122;
    pub const VOICE_ASSISTANT_SET_CONFIGURATION: u32 = 123;
}

// ---------------------------------------------------------------------------
// Voice assistant feature flags (DeviceInfoResponse bitmask)
// ---------------------------------------------------------------------------

pub const FEATURE_VOICE_ASSISTANT: u32 = 1 << 0;
pub const FEATURE_API_AUDIO: u32 = 1 << 2;
pub const FEATURE_TIMERS: u32 = 1 << 3;
pub const FEATURE_ANNOUNCE: u32 = 1 << 4;
pub const FEATURE_START_CONVERSATION: u32 = 1 << 5;

/// Everything this satellite supports.
pub const SATELLITE_FEATURES: u32 = FEATURE_VOICE_ASSISTANT
    | FEATURE_API_AUDIO
    | FEATURE_TIMERS
    | FEATURE_ANNOUNCE
    | FEATURE_START_CONVERSATION;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Voice assistant pipeline events delivered by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum VoiceEvent {
    Error = 0,
    RunStart = 1,
    RunEnd = 2,
    SttStart = 3,
    SttEnd = 4,
    IntentStart = 5,
    IntentEnd = 6,
    TtsStart = 7,
    TtsEnd = 8,
    WakeWordStart = 9,
    WakeWordEnd = 10,
    SttVadStart = 11,
    SttVadEnd = 12,
    IntentProgress = 100,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum TimerEvent {
    Started = 0,
    Updated = 1,
    Cancelled = 2,
    Finished = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum MediaPlayerState {
    None = 0,
    Idle = 1,
    Playing = 2,
    Paused = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum MediaPlayerCommand {
    Play = 0,
    Pause = 1,
    Stop = 2,
    Mute = 3,
    Unmute = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ServiceArgType {
    Bool = 0,
    Int = 1,
    Float = 2,
    String = 3,
}

// ---------------------------------------------------------------------------
// Handshake and liveness
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub client_info: String,
    #[prost(uint32, tag = "2")]
    pub api_version_major: u32,
    #[prost(uint32, tag = "3")]
    pub api_version_minor: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct HelloResponse {
    #[prost(uint32, tag = "1")]
    pub api_version_major: u32,
    #[prost(uint32, tag = "2")]
    pub api_version_minor: u32,
    #[prost(string, tag = "3")]
    pub server_info: String,
    #[prost(string, tag = "4")]
    pub name: String,
}

/// Upstream wire name: ConnectRequest.
#[derive(Clone, PartialEq, Message)]
pub struct AuthenticationRequest {
    #[prost(string, tag = "1")]
    pub password: String,
}

/// Upstream wire name: ConnectResponse.
#[derive(Clone, PartialEq, Message)]
pub struct AuthenticationResponse {
    #[prost(bool, tag = "1")]
    pub invalid_password: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct DisconnectRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct DisconnectResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct PingResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfoRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfoResponse {
    #[prost(bool, tag = "1")]
    pub uses_password: bool,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub mac_address: String,
    #[prost(string, tag = "4")]
    pub esphome_version: String,
    #[prost(string, tag = "6")]
    pub model: String,
    #[prost(string, tag = "8")]
    pub project_name: String,
    #[prost(string, tag = "9")]
    pub project_version: String,
    #[prost(string, tag = "12")]
    pub manufacturer: String,
    #[prost(string, tag = "13")]
    pub friendly_name: String,
    #[prost(uint32, tag = "17")]
    pub voice_assistant_feature_flags: u32,
}

// ---------------------------------------------------------------------------
// Entity listing and states
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesDoneResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct SubscribeHomeAssistantStatesRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesSensorResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(string, tag = "6")]
    pub unit_of_measurement: String,
    #[prost(int32, tag = "7")]
    pub accuracy_decimals: i32,
    #[prost(bool, tag = "8")]
    pub force_update: bool,
    #[prost(string, tag = "9")]
    pub device_class: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SensorStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(float, tag = "2")]
    pub state: f32,
    #[prost(bool, tag = "3")]
    pub missing_state: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesButtonResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(bool, tag = "6")]
    pub disabled_by_default: bool,
    #[prost(string, tag = "8")]
    pub device_class: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ButtonCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesMediaPlayerResponse {
    #[prost(string, tag = "1")]
    pub object_id: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub unique_id: String,
    #[prost(string, tag = "5")]
    pub icon: String,
    #[prost(bool, tag = "6")]
    pub disabled_by_default: bool,
    #[prost(bool, tag = "8")]
    pub supports_pause: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct MediaPlayerStateResponse {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(enumeration = "MediaPlayerState", tag = "2")]
    pub state: i32,
    #[prost(float, tag = "3")]
    pub volume: f32,
    #[prost(bool, tag = "4")]
    pub muted: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct MediaPlayerCommandRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(bool, tag = "2")]
    pub has_command: bool,
    #[prost(enumeration = "MediaPlayerCommand", tag = "3")]
    pub command: i32,
    #[prost(bool, tag = "4")]
    pub has_volume: bool,
    #[prost(float, tag = "5")]
    pub volume: f32,
    #[prost(bool, tag = "6")]
    pub has_media_url: bool,
    #[prost(string, tag = "7")]
    pub media_url: String,
    #[prost(bool, tag = "8")]
    pub has_announcement: bool,
    #[prost(bool, tag = "9")]
    pub announcement: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesServicesArgument {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "ServiceArgType", tag = "2")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntitiesServicesResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(fixed32, tag = "2")]
    pub key: u32,
    #[prost(message, repeated, tag = "3")]
    pub args: Vec<ListEntitiesServicesArgument>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExecuteServiceArgument {
    #[prost(bool, tag = "1")]
    pub bool_: bool,
    #[prost(int32, tag = "2")]
    pub legacy_int: i32,
    #[prost(float, tag = "3")]
    pub float_: f32,
    #[prost(string, tag = "4")]
    pub string_: String,
    #[prost(sint32, tag = "5")]
    pub int_: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExecuteServiceRequest {
    #[prost(fixed32, tag = "1")]
    pub key: u32,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<ExecuteServiceArgument>,
}

// ---------------------------------------------------------------------------
// Voice assistant
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantRequest {
    #[prost(bool, tag = "1")]
    pub start: bool,
    #[prost(string, tag = "2")]
    pub conversation_id: String,
    #[prost(uint32, tag = "3")]
    pub flags: u32,
    #[prost(string, tag = "5")]
    pub wake_word_phrase: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantEventData {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantEventResponse {
    #[prost(enumeration = "VoiceEvent", tag = "1")]
    pub event_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub data: Vec<VoiceAssistantEventData>,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantAudio {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub end: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantTimerEventResponse {
    #[prost(enumeration = "TimerEvent", tag = "1")]
    pub event_type: i32,
    #[prost(string, tag = "2")]
    pub timer_id: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint32, tag = "4")]
    pub total_seconds: u32,
    #[prost(uint32, tag = "5")]
    pub seconds_left: u32,
    #[prost(bool, tag = "6")]
    pub is_active: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantAnnounceRequest {
    #[prost(string, tag = "1")]
    pub media_id: String,
    #[prost(string, tag = "2")]
    pub text: String,
    #[prost(string, tag = "3")]
    pub preannounce_media_id: String,
    #[prost(bool, tag = "4")]
    pub start_conversation: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantAnnounceFinished {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantWakeWord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub wake_word: String,
    #[prost(string, repeated, tag = "3")]
    pub trained_languages: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantExternalWakeWord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub wake_word: String,
    #[prost(string, repeated, tag = "3")]
    pub trained_languages: Vec<String>,
    #[prost(string, tag = "4")]
    pub model_type: String,
    #[prost(string, tag = "5")]
    pub model_url: String,
    #[prost(uint32, tag = "6")]
    pub model_size: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantConfigurationRequest {
    #[prost(message, repeated, tag = "1")]
    pub external_wake_words: Vec<VoiceAssistantExternalWakeWord>,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantConfigurationResponse {
    #[prost(message, repeated, tag = "1")]
    pub available_wake_words: Vec<VoiceAssistantWakeWord>,
    #[prost(string, repeated, tag = "2")]
    pub active_wake_words: Vec<String>,
    #[prost(uint32, tag = "3")]
    pub max_active_wake_words: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VoiceAssistantSetConfiguration {
    #[prost(string, repeated, tag = "1")]
    pub active_wake_words: Vec<String>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A decoded API message, tagged with its variant.
///
/// The registry is the one place that pairs a wire type number with a
/// payload type, in both directions.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiMessage {
    HelloRequest(HelloRequest),
    HelloResponse(HelloResponse),
    AuthenticationRequest(AuthenticationRequest),
    AuthenticationResponse(AuthenticationResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    DeviceInfoRequest(DeviceInfoRequest),
    DeviceInfoResponse(DeviceInfoResponse),
    ListEntitiesRequest(ListEntitiesRequest),
    ListEntitiesSensorResponse(ListEntitiesSensorResponse),
    ListEntitiesDoneResponse(ListEntitiesDoneResponse),
    SensorStateResponse(SensorStateResponse),
    SubscribeHomeAssistantStatesRequest(SubscribeHomeAssistantStatesRequest),
    ListEntitiesServicesResponse(ListEntitiesServicesResponse),
    ExecuteServiceRequest(ExecuteServiceRequest),
    ListEntitiesButtonResponse(ListEntitiesButtonResponse),
    ButtonCommandRequest(ButtonCommandRequest),
    ListEntitiesMediaPlayerResponse(ListEntitiesMediaPlayerResponse),
    MediaPlayerStateResponse(MediaPlayerStateResponse),
    MediaPlayerCommandRequest(MediaPlayerCommandRequest),
    VoiceAssistantRequest(VoiceAssistantRequest),
    VoiceAssistantEventResponse(VoiceAssistantEventResponse),
    VoiceAssistantAudio(VoiceAssistantAudio),
    VoiceAssistantTimerEventResponse(VoiceAssistantTimerEventResponse),
    VoiceAssistantAnnounceRequest(VoiceAssistantAnnounceRequest),
    VoiceAssistantAnnounceFinished(VoiceAssistantAnnounceFinished),
    VoiceAssistantConfigurationRequest(VoiceAssistantConfigurationRequest),
    VoiceAssistantConfigurationResponse(VoiceAssistantConfigurationResponse),
    VoiceAssistantSetConfiguration(VoiceAssistantSetConfiguration),
}

macro_rules! registry {
    ($( $variant:ident => $wire:path ),+ $(,)?) => {
        impl ApiMessage {
            /// Wire type number for this message.
            pub fn wire_type(&self) -> u32 {
                match self {
                    $( Self::$variant(_) => $wire, )+
                }
            }

            /// Serialize the payload body (without framing).
            pub fn encode_payload(&self) -> Vec<u8> {
                match self {
                    $( Self::$variant(m) => m.encode_to_vec(), )+
                }
            }

            /// Decode a payload by wire type number.
            ///
            /// `Ok(None)` means the type is not in the registry
            /// (forward-compat: the caller logs and ignores it).
            pub fn decode(
                wire_type: u32,
                payload: &[u8],
            ) -> Result<Option<Self>, prost::DecodeError> {
                Ok(Some(match wire_type {
                    $( $wire => Self::$variant(Message::decode(payload)?), )+
                    _ => return Ok(None),
                }))
            }
        }
    };
}

registry! {
    HelloRequest => wire::HELLO_REQUEST,
    HelloResponse => wire::HELLO_RESPONSE,
    AuthenticationRequest => wire::AUTHENTICATION_REQUEST,
    AuthenticationResponse => wire::AUTHENTICATION_RESPONSE,
    DisconnectRequest => wire::DISCONNECT_REQUEST,
    DisconnectResponse => wire::DISCONNECT_RESPONSE,
    PingRequest => wire::PING_REQUEST,
    PingResponse => wire::PING_RESPONSE,
    DeviceInfoRequest => wire::DEVICE_INFO_REQUEST,
    DeviceInfoResponse => wire::DEVICE_INFO_RESPONSE,
    ListEntitiesRequest => wire::LIST_ENTITIES_REQUEST,
    ListEntitiesSensorResponse => wire::LIST_ENTITIES_SENSOR_RESPONSE,
    ListEntitiesDoneResponse => wire::LIST_ENTITIES_DONE_RESPONSE,
    SensorStateResponse => wire::SENSOR_STATE_RESPONSE,
    SubscribeHomeAssistantStatesRequest => wire::SUBSCRIBE_HOME_ASSISTANT_STATES_REQUEST,
    ListEntitiesServicesResponse => wire::LIST_ENTITIES_SERVICES_RESPONSE,
    ExecuteServiceRequest => wire::EXECUTE_SERVICE_REQUEST,
    ListEntitiesButtonResponse => wire::LIST_ENTITIES_BUTTON_RESPONSE,
    ButtonCommandRequest => wire::BUTTON_COMMAND_REQUEST,
    ListEntitiesMediaPlayerResponse => wire::LIST_ENTITIES_MEDIA_PLAYER_RESPONSE,
    MediaPlayerStateResponse => wire::MEDIA_PLAYER_STATE_RESPONSE,
    MediaPlayerCommandRequest => wire::MEDIA_PLAYER_COMMAND_REQUEST,
    VoiceAssistantRequest => wire::VOICE_ASSISTANT_REQUEST,
    VoiceAssistantEventResponse => wire::VOICE_ASSISTANT_EVENT_RESPONSE,
    VoiceAssistantAudio => wire::VOICE_ASSISTANT_AUDIO,
    VoiceAssistantTimerEventResponse => wire::VOICE_ASSISTANT_TIMER_EVENT_RESPONSE,
    VoiceAssistantAnnounceRequest => wire::VOICE_ASSISTANT_ANNOUNCE_REQUEST,
    VoiceAssistantAnnounceFinished => wire::VOICE_ASSISTANT_ANNOUNCE_FINISHED,
    VoiceAssistantConfigurationRequest => wire::VOICE_ASSISTANT_CONFIGURATION_REQUEST,
    VoiceAssistantConfigurationResponse => wire::VOICE_ASSISTANT_CONFIGURATION_RESPONSE,
    VoiceAssistantSetConfiguration => wire::VOICE_ASSISTANT_SET_CONFIGURATION,
}

impl VoiceAssistantEventResponse {
    /// Flatten the repeated name/value pairs into a lookup helper.
    pub fn data_value(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}
