//! Live-update fan-out to SSE subscribers.

mod event;
mod hub;

pub use event::{BroadcastEvent, SessionStatus, SubscriberKind};
pub use hub::{BroadcastHub, SubscriberId, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
