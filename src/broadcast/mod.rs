//! Status broadcast module
//!
//! Fans status messages out to every connected observer. Each observer
//! gets its own bounded queue so a slow one never stalls the publisher.

pub mod hub;

pub use hub::{BroadcastHub, SubscriberId, Subscription, DEFAULT_QUEUE_CAPACITY};
