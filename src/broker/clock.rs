//! Logical clock
//!
//! A single server-side Lamport-style counter. The clock lives inside the
//! `EventBus` state and is only advanced while the bus lock is held, so the
//! values it hands out form one total order matching the order in which the
//! broker serialized subscribe/unsubscribe/publish calls.
//!
//! Clients never hold or merge their own counter. A receiver can only
//! conclude that an event with a larger stamp was observed later by the
//! server than one with a smaller stamp, which is enough to spot reordering
//! or gaps on a single stream.

pub type LamportTimestamp = u64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogicalClock {
    value: LamportTimestamp,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Advance the clock by one and return the new value.
    pub fn tick(&mut self) -> LamportTimestamp {
        self.value += 1;
        self.value
    }

    /// Current value without advancing.
    pub fn now(&self) -> LamportTimestamp {
        self.value
    }
}
