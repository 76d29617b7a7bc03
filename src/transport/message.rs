use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Event, LamportTimestamp};
use crate::utils::ChatError;

/// Flag carried by a successful send acknowledgement.
pub const ACK_OK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Publish one chat line to a topic.
    #[serde(rename = "send")]
    Send {
        author: String,
        topic: String,
        message: String,
    },
    /// Turn this connection into a stream of the topic's events.
    #[serde(rename = "receive")]
    Receive { author: String, topic: String },
}

impl ClientMessage {
    /// Reject requests the broker cannot route.
    pub fn validate(&self) -> Result<(), ChatError> {
        let (author, topic) = match self {
            ClientMessage::Send { author, topic, .. } => (author, topic),
            ClientMessage::Receive { author, topic } => (author, topic),
        };

        if author.trim().is_empty() {
            return Err(ChatError::Malformed("author must not be empty".to_string()));
        }
        if topic.trim().is_empty() {
            return Err(ChatError::Malformed("topic must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ack")]
    Ack { flag: String },
    #[serde(rename = "message")]
    Message {
        text: String,
        lamport_timestamp: LamportTimestamp,
        topic: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn ack() -> Self {
        ServerMessage::Ack {
            flag: ACK_OK.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_ws(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}

impl From<&Event> for ServerMessage {
    fn from(event: &Event) -> Self {
        ServerMessage::Message {
            text: event.render(),
            lamport_timestamp: event.lamport_timestamp,
            topic: event.topic.clone(),
        }
    }
}
