//! Entity bridge.
//!
//! Declares the controller-visible entities (sensors, buttons, services,
//! media player) and routes command messages to their registered
//! handlers. The handlers themselves are collaborators injected at
//! startup; the bridge only owns the declaration and dispatch contract.
//!
//! Key ranges are disjoint per category: sensors < 100, buttons 100-199,
//! services 200-299, media player 10.

pub mod buttons;
pub mod media_player;
pub mod sensors;
pub mod services;
pub mod system;

use std::sync::Arc;

use tracing::warn;

use crate::events::EventSender;
use crate::protocol::messages::{
    ApiMessage, ButtonCommandRequest, ExecuteServiceRequest, ListEntitiesDoneResponse,
    MediaPlayerCommandRequest,
};
use crate::state::ServerState;

use buttons::ButtonEntity;
use media_player::MediaPlayerEntity;
use sensors::SensorEntity;
use services::ServiceEntity;

/// Process-scoped entity registry, wired once by the startup builder and
/// shared by every connection.
#[derive(Default)]
pub struct EntityHandlers {
    pub sensors: Vec<SensorEntity>,
    pub buttons: Vec<ButtonEntity>,
    pub services: Vec<ServiceEntity>,
}

/// Per-connection bridge: shared declarations plus the connection's media
/// player state.
pub struct EntityBridge {
    handlers: Arc<EntityHandlers>,
    media_player: MediaPlayerEntity,
}

impl EntityBridge {
    pub fn new(handlers: Arc<EntityHandlers>, state: Arc<ServerState>, events: EventSender) -> Self {
        Self {
            handlers,
            media_player: MediaPlayerEntity::new(state, events),
        }
    }

    /// Every entity definition, terminated by the done marker.
    pub fn list_entities(&self) -> Vec<ApiMessage> {
        let mut msgs = Vec::new();
        for sensor in &self.handlers.sensors {
            msgs.push(ApiMessage::ListEntitiesSensorResponse(sensor.definition()));
        }
        msgs.push(ApiMessage::ListEntitiesMediaPlayerResponse(
            self.media_player.definition(),
        ));
        for button in &self.handlers.buttons {
            msgs.push(ApiMessage::ListEntitiesButtonResponse(button.definition()));
        }
        for service in &self.handlers.services {
            msgs.push(ApiMessage::ListEntitiesServicesResponse(service.definition()));
        }
        msgs.push(ApiMessage::ListEntitiesDoneResponse(
            ListEntitiesDoneResponse {},
        ));
        msgs
    }

    /// One state snapshot per stateful entity.
    pub fn subscribe_states(&self) -> Vec<ApiMessage> {
        let mut msgs = Vec::new();
        for sensor in &self.handlers.sensors {
            msgs.push(ApiMessage::SensorStateResponse(sensor.state()));
        }
        msgs.push(ApiMessage::MediaPlayerStateResponse(
            self.media_player.state_message(),
        ));
        msgs
    }

    pub fn handle_button(&self, msg: &ButtonCommandRequest) -> Vec<ApiMessage> {
        match self.handlers.buttons.iter().find(|b| b.key == msg.key) {
            Some(button) => button.press(),
            None => warn!(key = msg.key, "button command for unknown key"),
        }
        Vec::new()
    }

    pub fn handle_service(&self, msg: &ExecuteServiceRequest) -> Vec<ApiMessage> {
        match self.handlers.services.iter().find(|s| s.key == msg.key) {
            Some(service) => service.execute(&msg.args),
            None => warn!(key = msg.key, "service request for unknown key"),
        }
        Vec::new()
    }

    pub fn handle_media_player(&mut self, msg: &MediaPlayerCommandRequest) -> Vec<ApiMessage> {
        self.media_player.handle_command(msg)
    }

    /// Completion of a media-player playlist item.
    pub fn handle_media_done(
        &mut self,
        outcome: crate::audio::PlaybackOutcome,
    ) -> Vec<ApiMessage> {
        self.media_player.handle_playback_done(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOutput, DoneCallback, PlaybackOutcome};
    use crate::config::SatelliteConfig;
    use crate::events::core_channel;
    use crate::protocol::messages::{ExecuteServiceArgument, ServiceArgType};
    use super::services::{ServiceArg, ServiceArgValue};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct SilentPlayer;

    impl AudioOutput for SilentPlayer {
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

    fn bridge_with(handlers: EntityHandlers) -> (EntityBridge, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SatelliteConfig {
            device_name: Some("test-dev".into()),
            preferences_path: Some(dir.path().join("preferences.json")),
            ..Default::default()
        };
        let state = Arc::new(ServerState::new(
            &config,
            BTreeMap::new(),
            Arc::new(SilentPlayer),
            Arc::new(SilentPlayer),
        ));
        let (tx, _rx) = core_channel();
        (EntityBridge::new(Arc::new(handlers), state, tx), dir)
    }

    #[test]
    fn test_list_entities_ends_with_done() {
        let handlers = EntityHandlers {
            sensors: vec![SensorEntity::new(0, "cpu_percent", "CPU Usage", "%", 1)
                .with_read(|| Some(12.5))],
            buttons: vec![ButtonEntity::new(100, "shutdown", "Shut Down", "mdi:power", || {})],
            services: vec![ServiceEntity::new(
                200,
                "notify",
                vec![ServiceArg::new("message", ServiceArgType::String)],
                |_| {},
            )],
        };
        let (bridge, _dir) = bridge_with(handlers);

        let msgs = bridge.list_entities();
        // sensor + media player + button + service + done
        assert_eq!(msgs.len(), 5);
        assert!(matches!(
            msgs.last(),
            Some(ApiMessage::ListEntitiesDoneResponse(_))
        ));
    }

    #[test]
    fn test_subscribe_states_reports_missing_values() {
        let handlers = EntityHandlers {
            sensors: vec![
                SensorEntity::new(0, "cpu_percent", "CPU Usage", "%", 1).with_read(|| Some(40.0)),
                SensorEntity::new(1, "battery", "Battery", "%", 0).with_read(|| None),
            ],
            ..Default::default()
        };
        let (bridge, _dir) = bridge_with(handlers);

        let msgs = bridge.subscribe_states();
        let ApiMessage::SensorStateResponse(ok) = &msgs[0] else {
            panic!("expected sensor state");
        };
        assert!((ok.state - 40.0).abs() < f32::EPSILON);
        assert!(!ok.missing_state);
        let ApiMessage::SensorStateResponse(missing) = &msgs[1] else {
            panic!("expected sensor state");
        };
        assert!(missing.missing_state);
    }

    #[test]
    fn test_button_dispatch_by_key() {
        let presses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&presses);
        let handlers = EntityHandlers {
            buttons: vec![ButtonEntity::new(100, "shutdown", "Shut Down", "mdi:power", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })],
            ..Default::default()
        };
        let (bridge, _dir) = bridge_with(handlers);

        bridge.handle_button(&ButtonCommandRequest { key: 100 });
        assert_eq!(presses.load(Ordering::SeqCst), 1);

        // Unknown key: logged, ignored.
        bridge.handle_button(&ButtonCommandRequest { key: 150 });
        assert_eq!(presses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_argument_decoding() {
        let received = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&received);
        let handlers = EntityHandlers {
            services: vec![ServiceEntity::new(
                200,
                "notify",
                vec![
                    ServiceArg::new("title", ServiceArgType::String),
                    ServiceArg::new("volume", ServiceArgType::Int),
                ],
                move |args| {
                    *sink.lock().unwrap() = Some(args);
                },
            )],
            ..Default::default()
        };
        let (bridge, _dir) = bridge_with(handlers);

        bridge.handle_service(&ExecuteServiceRequest {
            key: 200,
            args: vec![
                ExecuteServiceArgument {
                    string_: "Dinner".into(),
                    ..Default::default()
                },
                ExecuteServiceArgument {
                    int_: 42,
                    ..Default::default()
                },
            ],
        });

        let args = received.lock().unwrap().take().unwrap();
        assert_eq!(
            args.get("title"),
            Some(&ServiceArgValue::String("Dinner".into()))
        );
        assert_eq!(args.get("volume"), Some(&ServiceArgValue::Int(42)));
    }
}
