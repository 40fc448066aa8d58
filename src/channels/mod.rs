//! Channel and source registry
//!
//! The registry maps channel ids to ordered candidate source lists. It is
//! the only structure written by the admin path and read by the streaming
//! path: every mutation swaps a complete `Arc<Channel>` snapshot, so readers
//! (playlist projection, failover passes) never observe a partially-updated
//! channel.

pub mod channel;
pub mod store;

pub use channel::{Channel, Source};
pub use store::ChannelRegistry;
