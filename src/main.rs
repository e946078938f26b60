//! Voice satellite entry point.
//!
//! Builds the whole graph eagerly at startup — config, wake-word catalog,
//! players, capture, entities, mDNS — so initialization failures surface
//! here instead of mid-session, then serves the API until Ctrl-C.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_satellite::audio::capture::start_capture;
use voice_satellite::audio::playback::RodioPlayer;
use voice_satellite::audio::{AudioOutput, MicSource, NullMic};
use voice_satellite::config::{self, paths::data_dir};
use voice_satellite::entities::system::default_handlers;
use voice_satellite::events::core_channel;
use voice_satellite::mdns::MdnsAdvertiser;
use voice_satellite::server::{self, Satellite};
use voice_satellite::state::ServerState;
use voice_satellite::wake_word;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: file log in the data dir, stderr when that's unavailable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = data_dir();
    let use_file = std::fs::create_dir_all(&log_dir).is_ok();

    let _guard: Option<tracing_appender::non_blocking::WorkerGuard>;
    if use_file {
        let file_appender = tracing_appender::rolling::never(&log_dir, "voice-satellite.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
    } else {
        _guard = None;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::read_config();
    info!(?config, "configuration loaded");

    // Wake-word catalog, loaded once.
    let catalog = wake_word::load_catalog(&config.resolved_wake_word_dir());

    // Two independent playback handles.
    let music_player: Arc<dyn AudioOutput> = Arc::new(RodioPlayer::new("music"));
    let tts_player: Arc<dyn AudioOutput> = Arc::new(RodioPlayer::new("tts"));

    let state = Arc::new(ServerState::new(
        &config,
        catalog,
        music_player,
        tts_player,
    ));
    info!(
        name = %state.device_name,
        mac = %state.mac_address,
        active = ?state.active_wake_words(),
        "server state ready",
    );

    // Core event channel: capture thread, playback workers, and the
    // wake-word engine all post back through this.
    let (events_tx, events_rx) = core_channel();

    let mic: Arc<dyn MicSource> =
        match start_capture(events_tx.clone(), config.microphone_device.clone()) {
            Ok(handle) => {
                info!("microphone capture ready");
                Arc::new(handle)
            }
            Err(e) => {
                warn!("microphone capture unavailable: {e}");
                Arc::new(NullMic)
            }
        };

    // Entity declarations with the default desktop collaborators.
    let handlers = Arc::new(default_handlers());

    // Advertise on the local network. Failure is logged and the satellite
    // keeps serving; the controller can still add it by address.
    let advertiser = match MdnsAdvertiser::register(&state, config.api_port) {
        Ok(advertiser) => Some(advertiser),
        Err(e) => {
            error!("mDNS registration failed: {e:#}");
            None
        }
    };

    let satellite = Satellite {
        state,
        handlers,
        mic,
        events_tx,
    };

    let bind_address = config.api_bind_address.clone();
    let result = tokio::select! {
        served = server::serve(satellite, &bind_address, config.api_port, events_rx) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    // Unregister synchronously before exit so the controller notices.
    if let Some(advertiser) = advertiser {
        advertiser.unregister();
    }
    info!("voice satellite stopped");
    result
}
