//! Subscriber endpoints
//!
//! An endpoint is the broker-side delivery target of one streaming session.
//! It is split in two halves created together by [`endpoint`]:
//! - [`Endpoint`] is cloned into the bus registry and into dispatch snapshots;
//!   it holds the sending side of a bounded queue.
//! - [`Mailbox`] stays with the owning session; it holds the receiving side
//!   and observes eviction.
//!
//! Both halves share the same `SubscriberId`, which is what the bus compares
//! when removing an endpoint. Two endpoints with the same owner name are
//! still different endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, Receiver, Sender, error::SendTimeoutError};
use uuid::Uuid;

use crate::broker::event::Event;

pub type SubscriberId = String;

/// Outcome of handing one event to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The mailbox was dropped; the session is already gone.
    Closed,
    /// The queue stayed full for the whole delivery timeout.
    Evicted,
    /// The endpoint was evicted by an earlier dispatch.
    Skipped,
}

#[derive(Debug, Default)]
struct Eviction {
    evicted: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: SubscriberId,
    sender: Sender<Event>,
    eviction: Arc<Eviction>,
}

#[derive(Debug)]
pub struct Mailbox {
    pub id: SubscriberId,
    receiver: Receiver<Event>,
    eviction: Arc<Eviction>,
}

/// Create a fresh endpoint whose queue holds `capacity` events. A capacity
/// of zero is raised to one.
pub fn endpoint(capacity: usize) -> (Endpoint, Mailbox) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let id = format!("endpoint-{}", Uuid::new_v4());
    let eviction = Arc::new(Eviction::default());

    (
        Endpoint {
            id: id.clone(),
            sender,
            eviction: eviction.clone(),
        },
        Mailbox {
            id,
            receiver,
            eviction,
        },
    )
}

impl Endpoint {
    /// Send one event, waiting for queue space.
    ///
    /// With `timeout = None` this blocks until the session drains its queue,
    /// however long that takes. With a timeout, an endpoint that cannot
    /// accept the event in time is evicted and every later delivery to it
    /// is skipped.
    pub async fn deliver(&self, event: Event, timeout: Option<Duration>) -> Delivery {
        if self.is_evicted() {
            return Delivery::Skipped;
        }

        match timeout {
            None => match self.sender.send(event).await {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
            Some(timeout) => match self.sender.send_timeout(event, timeout).await {
                Ok(()) => Delivery::Delivered,
                Err(SendTimeoutError::Closed(_)) => Delivery::Closed,
                Err(SendTimeoutError::Timeout(_)) => {
                    self.evict();
                    Delivery::Evicted
                }
            },
        }
    }

    pub fn evict(&self) {
        if !self.eviction.evicted.swap(true, Ordering::SeqCst) {
            self.eviction.notify.notify_one();
        }
    }

    pub fn is_evicted(&self) -> bool {
        self.eviction.evicted.load(Ordering::SeqCst)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Endpoint {}

impl Mailbox {
    /// Next delivered event, or `None` once every sending half is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Handle that observes eviction independently of receiving.
    pub fn eviction(&self) -> EvictionWatch {
        EvictionWatch(self.eviction.clone())
    }

    /// Resolves once the bus has evicted this endpoint.
    pub async fn evicted(&self) {
        self.eviction().evicted().await
    }
}

#[derive(Debug, Clone)]
pub struct EvictionWatch(Arc<Eviction>);

impl EvictionWatch {
    pub async fn evicted(&self) {
        if self.0.evicted.load(Ordering::SeqCst) {
            return;
        }
        // Eviction notifies once and leaves a permit if nobody is waiting.
        self.0.notify.notified().await;
    }
}
