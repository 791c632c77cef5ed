// Board subscriptions and UDP push fanout

pub mod protocol;
pub mod push;
pub mod registry;

pub use protocol::{PushEventKind, PushMessage};
pub use push::{PublishReport, PushDispatcher, MAX_DATAGRAM_LEN};
pub use registry::{Subscriber, SubscriptionRegistry};
