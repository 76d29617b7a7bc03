//! Topic management
//!
//! A `Topic` holds the ordered list of endpoints subscribed to a topic name.
//! Subscriptions are stored in a `Vec` in subscription order and removed by
//! endpoint identity with a linear scan, which is fine for chat-sized
//! fan-out. Topics are created on first subscribe and never removed.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the bus
//! lock) when modifying subscriptions.

use tokio::sync::oneshot;

use crate::broker::endpoint::{Endpoint, SubscriberId};

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: Vec<Endpoint>,
    /// Completion signal of the most recent dispatch on this topic. The next
    /// dispatch waits on it so deliveries leave in tick order.
    pub(crate) last_dispatch: Option<oneshot::Receiver<()>>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: Vec::new(),
            last_dispatch: None,
        }
    }

    /// Append an endpoint. An endpoint that is already subscribed is not
    /// added a second time.
    pub fn subscribe(&mut self, endpoint: Endpoint) -> bool {
        if self.contains(&endpoint.id) {
            return false;
        }
        self.subscribers.push(endpoint);
        true
    }

    /// Remove the first endpoint with the given identity.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> Option<Endpoint> {
        let position = self.subscribers.iter().position(|e| &e.id == id)?;
        Some(self.subscribers.remove(position))
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.iter().any(|e| &e.id == id)
    }

    /// Copy of the current subscriber list, used as a dispatch snapshot.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.subscribers.clone()
    }
}
