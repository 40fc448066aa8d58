//! Upstream fetch error classification

use thiserror::Error;

/// Error type for one fetch attempt against one source.
///
/// Recovered locally by the failover selector; only exhaustion of every
/// source is surfaced further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The connection could not be established within the connect timeout
    #[error("connect timed out")]
    ConnectTimeout,

    /// The source refused or dropped the connection
    #[error("connection failed: {0}")]
    ConnectRefused(String),

    /// The source answered, but not with a live stream (bad status or an
    /// HTML error page)
    #[error("not a live stream (status {status}, content type {content_type:?})")]
    NonStreamResponse {
        /// HTTP status returned by the source
        status: u16,
        /// Content type the source claimed
        content_type: String,
    },

    /// The stream produced no bytes within the read timeout
    #[error("read timed out")]
    ReadTimeout,

    /// The stream broke mid-read
    #[error("read failed: {0}")]
    ReadError(String),

    /// The source URL could not be parsed
    #[error("invalid source url: {0}")]
    BadUrl(String),
}
