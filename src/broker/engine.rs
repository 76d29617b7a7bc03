//! Event bus engine
//!
//! This module contains the in-memory broker responsible for:
//! - managing topics and their ordered subscriber lists
//! - advancing the shared logical clock on every broker-affecting call
//! - fanning published events out to a snapshot of a topic's subscribers
//!
//! Concurrency and usage notes:
//! - The public API is synchronous and takes `&self`; the bus guards its
//!   topics and clock as one unit behind a single `RwLock`. Share it as
//!   `Arc<EventBus>`.
//! - The lock is never held across an await. `publish` ticks the clock and
//!   copies the subscriber list under the lock, then hands delivery to a
//!   spawned dispatch task.
//! - Dispatch tasks of one topic run one after another in tick order, so a
//!   single endpoint receives events in the order their publishes ticked.
//! - A full endpoint queue delays dispatch for at most the configured
//!   delivery timeout, after which the endpoint is evicted. Without a
//!   timeout dispatch waits indefinitely, stalling later dispatches on the
//!   same topic (never the bus itself).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::broker::clock::{LamportTimestamp, LogicalClock};
use crate::broker::endpoint::{self, Delivery, Endpoint, Mailbox, SubscriberId};
use crate::broker::event::{Event, Payload};
use crate::broker::topic::Topic;
use crate::config::BrokerSettings;

/// How events are handed to subscriber endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Number of events an endpoint can hold before dispatch has to wait.
    pub endpoint_capacity: usize,
    /// Longest a dispatch waits on a full endpoint before evicting it.
    /// `None` waits forever.
    pub delivery_timeout: Option<Duration>,
}

impl DeliveryPolicy {
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            endpoint_capacity: 1,
            delivery_timeout: Some(Duration::from_millis(Self::DEFAULT_TIMEOUT_MS)),
        }
    }
}

impl From<&BrokerSettings> for DeliveryPolicy {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            endpoint_capacity: settings.endpoint_capacity.max(1),
            delivery_timeout: match settings.delivery_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, Topic>,
    clock: LogicalClock,
}

#[derive(Debug, Default)]
pub struct EventBus {
    state: RwLock<BusState>,
    policy: DeliveryPolicy,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_policy(DeliveryPolicy::default())
    }

    pub fn with_policy(policy: DeliveryPolicy) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            policy,
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Allocate a fresh endpoint sized by this bus's delivery policy.
    pub fn endpoint(&self) -> (Endpoint, Mailbox) {
        endpoint::endpoint(self.policy.endpoint_capacity)
    }

    // Every write leaves the state consistent; poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe an endpoint to a topic, creating the topic if needed.
    /// Returns the clock value assigned to this call.
    pub fn subscribe(&self, topic: &str, endpoint: Endpoint) -> LamportTimestamp {
        let mut state = self.write();
        let time = state.clock.tick();
        let id = endpoint.id.clone();

        let added = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(endpoint);

        if added {
            debug!(time, topic, endpoint = %id, "subscriber added");
        } else {
            debug!(time, topic, endpoint = %id, "endpoint already subscribed");
        }
        time
    }

    /// Remove the endpoint with the given identity from a topic. Unknown
    /// topics and endpoints are a no-op, but the clock still ticks.
    pub fn unsubscribe(&self, topic: &str, id: &SubscriberId) -> LamportTimestamp {
        let mut state = self.write();
        let time = state.clock.tick();

        let removed = state
            .topics
            .get_mut(topic)
            .and_then(|t| t.unsubscribe(id))
            .is_some();

        if removed {
            debug!(time, topic, endpoint = %id, "subscriber removed");
        } else {
            debug!(time, topic, endpoint = %id, "unsubscribe for unknown endpoint");
        }
        time
    }

    /// Publish a payload to every endpoint currently subscribed to `topic`.
    ///
    /// Ticks the clock twice (accepted, then dispatched) and returns the
    /// second value, which is the stamp every delivered copy carries.
    /// Delivery happens on a spawned task after the lock is released.
    pub fn publish(&self, topic: &str, payload: Payload) -> LamportTimestamp {
        let (stamp, snapshot, previous, done) = {
            let mut state = self.write();
            let accepted = state.clock.tick();
            debug!(time = accepted, topic, payload = %payload, "message accepted");
            let stamp = state.clock.tick();
            debug!(time = stamp, topic, "broadcast dispatched");

            let Some(t) = state.topics.get_mut(topic) else {
                return stamp;
            };
            if t.subscribers.is_empty() {
                return stamp;
            }

            let (done_tx, done_rx) = oneshot::channel();
            let previous = t.last_dispatch.replace(done_rx);
            (stamp, t.snapshot(), previous, done_tx)
        };

        let event = Event::new(topic, payload).stamped(stamp);
        self.dispatch(event, snapshot, previous, done);
        stamp
    }

    fn dispatch(
        &self,
        event: Event,
        snapshot: Vec<Endpoint>,
        previous: Option<oneshot::Receiver<()>>,
        done: oneshot::Sender<()>,
    ) {
        let timeout = self.policy.delivery_timeout;
        let Ok(handle) = Handle::try_current() else {
            warn!(
                topic = %event.topic,
                time = event.lamport_timestamp,
                "no async runtime available, event not dispatched"
            );
            return;
        };

        handle.spawn(async move {
            // An error only means the previous dispatch task died early.
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            for endpoint in &snapshot {
                match endpoint.deliver(event.clone(), timeout).await {
                    Delivery::Delivered | Delivery::Skipped => {}
                    Delivery::Closed => {
                        debug!(endpoint = %endpoint.id, "endpoint closed before delivery");
                    }
                    Delivery::Evicted => {
                        warn!(
                            endpoint = %endpoint.id,
                            topic = %event.topic,
                            time = event.lamport_timestamp,
                            "endpoint did not drain within delivery timeout, evicting"
                        );
                    }
                }
            }

            let _ = done.send(());
        });
    }

    /// Current clock value.
    pub fn clock(&self) -> LamportTimestamp {
        self.read().clock.now()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.read()
            .topics
            .get(topic)
            .map_or(0, |t| t.subscribers.len())
    }

    pub fn is_subscribed(&self, topic: &str, id: &SubscriberId) -> bool {
        self.read()
            .topics
            .get(topic)
            .is_some_and(|t| t.contains(id))
    }

    /// Names of every topic ever subscribed to, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().topics.keys().cloned().collect();
        names.sort();
        names
    }
}
