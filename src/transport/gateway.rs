//! RPC gateway
//!
//! Translates the two client requests into event bus calls:
//! - `send` publishes one chat line and is answered with an ack
//! - `receive` hands the connection to a `StreamingSession`, which owns it
//!   until the peer goes away
//!
//! A connection may issue any number of `send` requests. A `receive`
//! request is terminal: once the session ends the connection is closed.
//! Malformed requests are answered with an `error` frame and the connection
//! stays open.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{EventBus, LamportTimestamp, Payload};
use crate::session::{SessionEnd, StreamingSession};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::ChatError;

#[derive(Debug, Clone)]
pub struct Gateway {
    bus: Arc<EventBus>,
}

impl Gateway {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Publish a chat line. Returns the stamp its deliveries carry.
    pub fn send(&self, author: &str, topic: &str, message: &str) -> LamportTimestamp {
        let stamp = self.bus.publish(topic, Payload::chat(author, message));
        debug!(time = stamp, author, topic, "chat message published");
        stamp
    }

    /// Run one streaming session over the given connection halves.
    pub async fn receive<Tx, Rx>(&self, author: &str, topic: &str, sink: Tx, peer: Rx) -> SessionEnd
    where
        Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        Rx: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        StreamingSession::new(self.bus.clone(), author, topic)
            .run(sink, peer)
            .await
    }

    /// Serve requests arriving on one connection until it closes or turns
    /// into a receive stream that ends.
    pub async fn serve_connection<Tx, Rx>(&self, mut sink: Tx, mut peer: Rx, conn_id: &str)
    where
        Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        Rx: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = peer.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(conn = conn_id, error = %e, "connection read failed");
                    break;
                }
            };

            let request = match parse_request(text.as_str()) {
                Ok(request) => request,
                Err(e) => {
                    warn!(
                        conn = conn_id,
                        error = %e,
                        frame = %text.as_str().chars().take(100).collect::<String>(),
                        "invalid client message"
                    );
                    if reply(&mut sink, &ServerMessage::error(e.to_string())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match request {
                ClientMessage::Send {
                    author,
                    topic,
                    message,
                } => {
                    self.send(&author, &topic, &message);
                    if let Err(e) = reply(&mut sink, &ServerMessage::ack()).await {
                        debug!(conn = conn_id, error = %e, "failed to send ack");
                        break;
                    }
                }
                ClientMessage::Receive { author, topic } => {
                    info!(conn = conn_id, author = %author, topic = %topic, "receive stream opened");
                    let end = self.receive(&author, &topic, &mut sink, &mut peer).await;
                    info!(conn = conn_id, author = %author, topic = %topic, reason = ?end, "receive stream closed");
                    break;
                }
            }
        }

        // The peer may already be gone.
        let _ = sink.close().await;
    }
}

fn parse_request(text: &str) -> Result<ClientMessage, ChatError> {
    let request: ClientMessage =
        serde_json::from_str(text).map_err(|e| ChatError::Malformed(e.to_string()))?;
    request.validate()?;
    Ok(request)
}

pub(crate) async fn reply<Tx>(sink: &mut Tx, message: &ServerMessage) -> Result<(), ChatError>
where
    Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    sink.send(message.to_ws()?).await?;
    Ok(())
}
