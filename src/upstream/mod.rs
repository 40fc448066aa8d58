//! Upstream stream fetching
//!
//! Opens HTTP(S) connections to candidate sources, validates that the
//! response carries a live stream (an upstream HTML error page must never be
//! relayed as stream data), and exposes the body as a byte stream with
//! per-chunk read timeouts. The [`UpstreamFetch`] trait is the seam between
//! the relay engine and the network so tests can inject doubles.

pub mod error;
pub mod fetch;

pub use error::UpstreamError;
pub use fetch::{FetchConfig, FetchedStream, HttpFetcher, UpstreamFetch, DEFAULT_USER_AGENT};
