//! IPTV relay proxy
//!
//! Relays live television streams to clients while hiding real upstream
//! source addresses, and serves dynamically generated M3U playlists.
//!
//! - [`channels`]: registry mapping channel ids to ordered source lists
//! - [`upstream`]: validated HTTP fetching with read timeouts
//! - [`failover`]: deterministic source failover with a bounded retry budget
//! - [`relay`]: one shared upstream per channel, broadcast to every client
//! - [`playlist`]: playlist projection plus M3U rendering and import
//! - [`manifest`]: HLS manifest rewriting for segmented channels
//! - [`server`]: the axum HTTP surface
//!
//! # Quick start
//!
//! ```no_run
//! use iptv_relay::{AppState, ServerConfig, Source};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = AppState::new(ServerConfig::default());
//!
//!     state.channels.upsert_channel(
//!         "cctv1",
//!         "CCTV-1",
//!         "央视",
//!         None,
//!         vec![Source::new("http://upstream.example/cctv1/live.ts")],
//!     );
//!
//!     iptv_relay::server::serve(state).await
//! }
//! ```

pub mod channels;
pub mod error;
pub mod failover;
pub mod manifest;
pub mod playlist;
pub mod relay;
pub mod server;
pub mod upstream;

#[cfg(test)]
pub mod test_helpers;

pub use channels::{Channel, ChannelRegistry, Source};
pub use error::{Error, Result};
pub use relay::{RelayConfig, SessionRegistry};
pub use server::{AppState, ServerConfig};
pub use upstream::{FetchConfig, HttpFetcher, UpstreamFetch};
