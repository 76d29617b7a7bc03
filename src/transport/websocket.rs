//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them to WebSocket and hands each one
//! to the `Gateway` on its own task. Responsibilities:
//! - Bind the configured address (a bind failure is fatal)
//! - Enforce `broker.max_connections`; connections beyond the limit get an
//!   `error` frame and are closed
//! - Give every connection an id for log correlation

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};

use crate::broker::EventBus;
use crate::config::Settings;
use crate::transport::gateway::{Gateway, reply};
use crate::transport::message::ServerMessage;
use crate::utils::ChatError;

pub async fn start_websocket_server(
    addr: &str,
    bus: Arc<EventBus>,
    settings: Settings,
) -> Result<(), ChatError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ChatError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!("WebSocket server listening on ws://{addr}");
    serve(listener, bus, settings).await;
    Ok(())
}

/// Pause after a failed `accept`, e.g. while out of file descriptors.
pub(crate) const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections on an already bound listener, forever.
pub async fn serve(listener: TcpListener, bus: Arc<EventBus>, settings: Settings) {
    let gateway = Gateway::new(bus);
    let slots = Arc::new(Semaphore::new(settings.broker.max_connections));

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let gateway = gateway.clone();
        let slot = slots.clone().try_acquire_owned();
        let conn_id = format!("conn-{}", uuid::Uuid::new_v4());

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "WebSocket handshake error");
                    return;
                }
            };
            let (mut ws_sender, ws_receiver) = ws_stream.split();

            // Held for the lifetime of the connection.
            let Ok(_slot) = slot else {
                warn!(peer = %peer_addr, "connection limit reached, refusing");
                let _ = reply(&mut ws_sender, &ServerMessage::error("too many connections")).await;
                let _ = ws_sender.close().await;
                return;
            };

            info!(conn = %conn_id, peer = %peer_addr, "client connected");
            gateway
                .serve_connection(&mut ws_sender, ws_receiver, &conn_id)
                .await;
            debug!(conn = %conn_id, "client disconnected");
        });
    }
}
