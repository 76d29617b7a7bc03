//! Streaming sessions
//!
//! One `StreamingSession` backs one open receive request. Its lifecycle:
//! - Init: allocate an endpoint, subscribe it to the topic and publish a
//!   join event (the new subscriber sees its own join).
//! - Active: forward delivered events to the peer until the peer closes the
//!   stream, the stream errors, a forward fails, or the bus evicts the
//!   endpoint.
//! - Terminated: unsubscribe and publish a leave event.
//!
//! The terminate step lives in a drop guard, so it runs exactly once on
//! every exit path, including the session future being dropped mid-await.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Endpoint, Event, EventBus, Payload, SubscriberId};
use crate::transport::message::ServerMessage;
use crate::utils::ChatError;

/// Why a session left its Active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the stream.
    PeerClosed,
    /// Reading from the peer failed.
    PeerError,
    /// Writing an event to the peer failed.
    ForwardFailed,
    /// The bus gave up on the endpoint after a delivery timeout.
    Evicted,
}

#[derive(Debug)]
pub struct StreamingSession {
    bus: Arc<EventBus>,
    author: String,
    topic: String,
}

impl StreamingSession {
    pub fn new(bus: Arc<EventBus>, author: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            author: author.into(),
            topic: topic.into(),
        }
    }

    /// Run the session to completion over a peer connection split into its
    /// outgoing `sink` and incoming `peer` halves.
    pub async fn run<Tx, Rx>(self, mut sink: Tx, mut peer: Rx) -> SessionEnd
    where
        Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        Rx: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let (endpoint, mut mailbox) = self.bus.endpoint();
        let eviction = mailbox.eviction();
        let guard = SessionGuard::open(self.bus.clone(), &self.topic, &self.author, endpoint);

        let end = loop {
            tokio::select! {
                inbound = peer.next() => match inbound {
                    None | Some(Ok(WsMessage::Close(_))) => break SessionEnd::PeerClosed,
                    Some(Err(e)) => {
                        warn!(author = %self.author, topic = %self.topic, error = %e, "receive stream failed");
                        break SessionEnd::PeerError;
                    }
                    Some(Ok(_)) => {
                        debug!(author = %self.author, "ignoring inbound frame on receive stream");
                    }
                },
                () = eviction.evicted() => break SessionEnd::Evicted,
                delivered = mailbox.recv() => {
                    // The registry holds a sender until the guard unsubscribes.
                    let Some(event) = delivered else {
                        break SessionEnd::Evicted;
                    };
                    // A peer that stops reading must not hide an eviction.
                    tokio::select! {
                        forwarded = forward(&mut sink, &event) => {
                            if let Err(e) = forwarded {
                                warn!(author = %self.author, topic = %self.topic, error = %e, "failed to forward event");
                                break SessionEnd::ForwardFailed;
                            }
                        }
                        () = eviction.evicted() => break SessionEnd::Evicted,
                    }
                }
            }
        };

        debug!(author = %self.author, topic = %self.topic, reason = ?end, "session ending");
        drop(guard);
        end
    }
}

async fn forward<Tx>(sink: &mut Tx, event: &Event) -> Result<(), ChatError>
where
    Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let frame = ServerMessage::from(event).to_ws()?;
    sink.send(frame).await?;
    Ok(())
}

/// Subscribes and announces on creation; unsubscribes and announces the
/// departure on drop.
struct SessionGuard {
    bus: Arc<EventBus>,
    topic: String,
    author: String,
    endpoint_id: SubscriberId,
}

impl SessionGuard {
    fn open(bus: Arc<EventBus>, topic: &str, author: &str, endpoint: Endpoint) -> Self {
        let endpoint_id = endpoint.id.clone();
        let time = bus.subscribe(topic, endpoint);
        info!(time, author, topic, "subscriber joined");
        bus.publish(topic, Payload::joined(author));

        Self {
            bus,
            topic: topic.to_string(),
            author: author.to_string(),
            endpoint_id,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let time = self.bus.unsubscribe(&self.topic, &self.endpoint_id);
        info!(time, author = %self.author, topic = %self.topic, "subscriber left");
        self.bus.publish(&self.topic, Payload::left(self.author.as_str()));
    }
}

#[cfg(test)]
mod tests;
