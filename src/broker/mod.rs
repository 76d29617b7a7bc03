pub mod clock;
pub mod endpoint;
pub mod engine;
pub mod event;
pub mod topic;

pub use clock::{LamportTimestamp, LogicalClock};
pub use endpoint::{Endpoint, Mailbox, SubscriberId};
pub use engine::{DeliveryPolicy, EventBus};
pub use event::{Event, Payload};
