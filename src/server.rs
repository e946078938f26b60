//! TCP serve loop.
//!
//! One listener, at most one controller session at a time. The active
//! connection multiplexes socket reads with core events (mic chunks,
//! wake triggers, playback completions); responses for each turn go out
//! as a single batched write. On disconnect the session is torn down and
//! the listener accepts the next controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::audio::MicSource;
use crate::entities::EntityHandlers;
use crate::events::EventReceiver;
use crate::protocol::connection::ConnectionSession;
use crate::state::ServerState;

pub struct Satellite {
    pub state: Arc<ServerState>,
    pub handlers: Arc<EntityHandlers>,
    pub mic: Arc<dyn MicSource>,
    pub events_tx: crate::events::EventSender,
}

/// Accept controllers forever. Transient accept errors retry; a bound
/// failure is fatal at startup.
pub async fn serve(
    satellite: Satellite,
    bind_address: &str,
    port: u16,
    mut events: EventReceiver,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind_address, port))
        .await
        .with_context(|| format!("failed to bind {bind_address}:{port}"))?;
    info!(%bind_address, port, "API server listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }
        };
        info!(%peer, "controller connected");
        satellite.state.set_connected(true);

        if let Err(e) = run_connection(&satellite, stream, &mut events).await {
            warn!("connection ended: {e:#}");
        }

        satellite.state.set_connected(false);
        // Events raised against the old session are stale; drop them so
        // the next controller starts clean.
        while events.try_recv().is_ok() {}
    }
}

async fn run_connection(
    satellite: &Satellite,
    mut stream: TcpStream,
    events: &mut EventReceiver,
) -> anyhow::Result<()> {
    let mut session = ConnectionSession::new(
        Arc::clone(&satellite.state),
        Arc::clone(&satellite.handlers),
        Arc::clone(&satellite.mic),
        satellite.events_tx.clone(),
    );
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut read_buf) => {
                let n = read.context("socket read failed")?;
                if n == 0 {
                    break; // controller closed the connection
                }
                let reply = match session.handle_data(&read_buf[..n]) {
                    Ok(reply) => reply,
                    Err(e) => {
                        session.on_disconnect();
                        anyhow::bail!("framing violation, closing: {e}");
                    }
                };
                if !reply.is_empty() {
                    writer.write_all(&reply).await.context("socket write failed")?;
                }
                if session.is_closing() {
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let reply = session.handle_event(event);
                if !reply.is_empty() {
                    writer.write_all(&reply).await.context("socket write failed")?;
                }
            }
        }
    }

    session.on_disconnect();
    Ok(())
}
