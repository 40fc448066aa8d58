//! Broadcast payload and session lifecycle types

use bytes::Bytes;

/// Why a session stopped producing data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Failover exhausted every registered source
    SourcesExhausted,
    /// The last client detached, or the server shut the session down
    Finished,
}

/// One unit of the per-channel broadcast.
///
/// Cheap to clone: the payload is reference-counted `Bytes`, so every
/// subscriber shares one allocation.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A run of stream bytes from the current upstream
    Data(Bytes),
    /// Terminal signal; no more data will follow
    End(CloseReason),
}

/// Session lifecycle as observed by attached clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Failover is still acquiring the first upstream
    Connecting,
    /// Bytes are flowing; client responses use this content type
    Streaming {
        /// Content type of the relayed stream
        content_type: String,
    },
    /// Session over; no new clients should join
    Closed(CloseReason),
}
