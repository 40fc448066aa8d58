//! M3U playlist rendering and parsing
//!
//! The rendered format matches what IPTV players expect: an `#EXTM3U`
//! header, then per channel an `#EXTINF` line carrying `tvg-id`,
//! `tvg-logo` and `group-title` attributes followed by the proxied stream
//! URL. Parsing accepts the same dialect from external playlists.

use indexmap::IndexMap;

use crate::channels::{ChannelRegistry, Source};

use super::project::PlaylistEntry;

/// MIME type for rendered playlists
pub const M3U_CONTENT_TYPE: &str = "audio/x-mpegurl";

/// Render playlist rows into M3U text. Unplayable channels are omitted;
/// an empty row set still yields a valid playlist (header only).
pub fn render_m3u(entries: &[PlaylistEntry], base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut out = String::from("#EXTM3U\n");

    for entry in entries.iter().filter(|e| e.playable) {
        out.push_str("#EXTINF:-1 tvg-id=\"");
        out.push_str(&entry.id);
        out.push('"');
        if let Some(logo) = &entry.logo_url {
            out.push_str(" tvg-logo=\"");
            out.push_str(logo);
            out.push('"');
        }
        out.push_str(" group-title=\"");
        out.push_str(&entry.group);
        out.push_str("\", ");
        out.push_str(&entry.display_name);
        out.push('\n');
        out.push_str(base);
        out.push_str("/proxy/channel/");
        out.push_str(&entry.id);
        out.push('\n');
    }

    out
}

/// Channel data recovered from one external playlist entry
#[derive(Debug, Clone, PartialEq)]
pub struct M3uEntry {
    /// Channel id: `tvg-id` if present, otherwise slugged from the name
    pub id: String,
    /// Display name
    pub name: String,
    /// Group label; empty when the playlist has none
    pub group: String,
    /// Logo URL if present
    pub logo_url: Option<String>,
    /// Stream URL
    pub url: String,
}

/// Parse an external M3U playlist into entries.
///
/// Tolerant of unknown `#` directives; an `#EXTINF` line with no following
/// URL line is dropped.
pub fn parse_m3u(content: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(String, String, String, Option<String>)> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix("#EXTINF") {
            let tvg_id = attribute(info, "tvg-id");
            let tvg_name = attribute(info, "tvg-name");
            let logo = attribute(info, "tvg-logo");
            let group = attribute(info, "group-title").unwrap_or_default();

            let name = display_name(info)
                .or(tvg_name)
                .unwrap_or_default();
            let id = match tvg_id.filter(|id| !id.is_empty()) {
                Some(id) => id,
                None => slug(&name),
            };

            pending = Some((id, name, group, logo));
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else if let Some((id, name, group, logo)) = pending.take() {
            entries.push(M3uEntry {
                id,
                name,
                group,
                logo_url: logo,
                url: line.to_string(),
            });
        }
    }

    entries
}

/// Import an external playlist: entries sharing an id become one channel
/// with multiple sources (in playlist order), fed to the registry as
/// upserts. Returns the number of channels imported.
pub fn import_m3u(registry: &ChannelRegistry, content: &str) -> usize {
    let mut merged: IndexMap<String, (String, String, Option<String>, Vec<Source>)> =
        IndexMap::new();

    for entry in parse_m3u(content) {
        let M3uEntry {
            id,
            name,
            group,
            logo_url,
            url,
        } = entry;
        let slot = merged
            .entry(id)
            .or_insert_with(|| (name, group, logo_url, Vec::new()));
        slot.3.push(Source::new(url));
    }

    let count = merged.len();
    for (id, (name, group, logo, sources)) in merged {
        registry.upsert_channel(id, name, group, logo, sources);
    }
    count
}

/// Extract a quoted `key="value"` attribute from an `#EXTINF` line
fn attribute(line: &str, key: &str) -> Option<String> {
    let pattern = format!("{key}=\"");
    let start = line.find(&pattern)? + pattern.len();
    let end = line[start..].find('"')?;
    Some(line[start..start + end].to_string())
}

/// The display name follows the last attribute: everything after the comma
/// that comes after the final quote (names may themselves contain commas).
fn display_name(info: &str) -> Option<String> {
    let search_from = info.rfind('"').map_or(0, |q| q + 1);
    let comma = info[search_from..].find(',')?;
    let name = info[search_from + comma + 1..].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Identifier derived from a display name when the playlist carries no
/// `tvg-id`. Falls back to the name itself for names with no ASCII at all.
fn slug(name: &str) -> String {
    let slugged: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if slugged.is_empty() {
        name.to_string()
    } else {
        slugged
    }
}
