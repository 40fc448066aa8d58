//! Segmented-stream manifest adaptation
//!
//! HLS channels are not relayed as one long byte stream: players fetch a
//! manifest, then the segments it lists. This module rewrites fetched
//! manifests so every segment reference points back at the proxy's segment
//! route, keeping real upstream addresses hidden.

pub mod hls;

pub use hls::{is_hls_url, rewrite_manifest};
