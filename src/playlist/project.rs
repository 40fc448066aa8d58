//! Read-only playlist projection

use crate::channels::ChannelRegistry;

/// One playlist row
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    /// Channel identifier
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Group label
    pub group: String,
    /// Optional logo URL
    pub logo_url: Option<String>,
    /// False when the channel has no registered sources
    pub playable: bool,
}

/// Project current registry state into playlist rows, in channel insertion
/// order. Pure function of registry state; an unknown group yields an empty
/// vec, not an error.
pub fn project(registry: &ChannelRegistry, group: Option<&str>) -> Vec<PlaylistEntry> {
    registry
        .channels(group)
        .iter()
        .map(|channel| PlaylistEntry {
            id: channel.id.clone(),
            display_name: channel.display_name.clone(),
            group: channel.group.clone(),
            logo_url: channel.logo_url.clone(),
            playable: channel.is_playable(),
        })
        .collect()
}
