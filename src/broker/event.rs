//! Event definitions for the broker
//!
//! `Event` is the internal representation handed to subscriber endpoints.
//! The payload is a closed set of chat actions so consumers can match on it
//! exhaustively instead of inspecting an untyped value.
//!
//! Notes on fields:
//! - `topic`: topic name used for routing
//! - `payload`: what happened (join, leave, chat line)
//! - `lamport_timestamp`: the clock value of the publish's dispatch tick;
//!   `0` until the broker stamps it

use std::fmt;

use crate::broker::clock::LamportTimestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Joined { author: String },
    Left { author: String },
    Chat { author: String, text: String },
}

impl Payload {
    pub fn joined(author: impl Into<String>) -> Self {
        Payload::Joined {
            author: author.into(),
        }
    }

    pub fn left(author: impl Into<String>) -> Self {
        Payload::Left {
            author: author.into(),
        }
    }

    pub fn chat(author: impl Into<String>, text: impl Into<String>) -> Self {
        Payload::Chat {
            author: author.into(),
            text: text.into(),
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Payload::Joined { author } | Payload::Left { author } | Payload::Chat { author, .. } => {
                author
            }
        }
    }
}

/// Renders the payload the way it is shown to chat users.
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Joined { author } => write!(f, "{author} joined"),
            Payload::Left { author } => write!(f, "{author} left"),
            Payload::Chat { author, text } => write!(f, "{author}: {text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: String,
    pub payload: Payload,
    pub lamport_timestamp: LamportTimestamp,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            lamport_timestamp: 0,
        }
    }

    pub fn stamped(mut self, lamport_timestamp: LamportTimestamp) -> Self {
        self.lamport_timestamp = lamport_timestamp;
        self
    }

    /// Rendered text of the payload, without the stamp.
    pub fn render(&self) -> String {
        self.payload.to_string()
    }
}
