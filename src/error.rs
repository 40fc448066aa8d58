//! Crate-wide error types
//!
//! Per-source upstream failures live in [`crate::upstream::UpstreamError`]
//! and are recovered by failover; this enum is what callers of the relay
//! engine and the HTTP layer see.

use thiserror::Error;

use crate::upstream::UpstreamError;

/// Error type for relay operations
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown channel id, or a channel with no registered sources
    #[error("channel not found: {0}")]
    NotFound(String),

    /// A single upstream source failed (connect/timeout/non-stream response)
    #[error("upstream unavailable: {0}")]
    Upstream(#[from] UpstreamError),

    /// Failover exhausted every registered source for the channel
    #[error("all sources failed for channel {channel}")]
    AllSourcesFailed {
        /// Channel whose failover ran dry
        channel: String,
    },

    /// The requesting client went away; triggers detach, never fatal
    #[error("client disconnected")]
    ClientDisconnected,

    /// Malformed admin input
    #[error("invalid input: {0}")]
    Validation(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
