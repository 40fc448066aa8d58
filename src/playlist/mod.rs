//! Playlist projection and M3U handling
//!
//! The projector is a pure, read-only view over the channel registry; the
//! M3U side renders that view for players and parses external playlists
//! into registry upserts.

pub mod m3u;
pub mod project;

pub use m3u::{import_m3u, parse_m3u, render_m3u, M3uEntry};
pub use project::{project, PlaylistEntry};
