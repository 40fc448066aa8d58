//! Channel and source records

use std::time::Instant;

/// One concrete upstream URL believed to carry a channel's live stream
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Upstream URL
    pub url: String,

    /// Failover rank; lower is tried first. Equal ranks keep insertion order.
    pub priority: u32,

    /// Whether the most recent fetch attempt succeeded. Advisory only:
    /// failover order stays deterministic regardless of health.
    pub healthy: bool,

    /// When this source was last tried
    pub last_checked: Option<Instant>,
}

impl Source {
    /// Rank assigned when the admin does not specify one
    pub const DEFAULT_PRIORITY: u32 = 100;

    /// Create a source with the default priority
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_priority(url, Self::DEFAULT_PRIORITY)
    }

    /// Create a source with an explicit priority rank
    pub fn with_priority(url: impl Into<String>, priority: u32) -> Self {
        Self {
            url: url.into(),
            priority,
            healthy: true,
            last_checked: None,
        }
    }
}

/// A logical TV channel exposed to clients
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stable identifier, unique within the registry
    pub id: String,

    /// Human-readable name for playlists
    pub display_name: String,

    /// Group/category label (`group-title` in M3U terms)
    pub group: String,

    /// Optional logo URL (`tvg-logo`)
    pub logo_url: Option<String>,

    /// Candidate upstreams, ordered by failover priority
    pub sources: Vec<Source>,
}

impl Channel {
    /// Create a channel; sources are reordered by priority (stable)
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        group: impl Into<String>,
        logo_url: Option<String>,
        mut sources: Vec<Source>,
    ) -> Self {
        sources.sort_by_key(|s| s.priority);
        Self {
            id: id.into(),
            display_name: display_name.into(),
            group: group.into(),
            logo_url,
            sources,
        }
    }

    /// A channel with no sources cannot be served
    pub fn is_playable(&self) -> bool {
        !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defaults() {
        let source = Source::new("http://example.com/live.ts");
        assert_eq!(source.priority, Source::DEFAULT_PRIORITY);
        assert!(source.healthy);
        assert!(source.last_checked.is_none());
    }

    #[test]
    fn test_sources_sorted_by_priority_stable() {
        let channel = Channel::new(
            "ch1",
            "Channel One",
            "News",
            None,
            vec![
                Source::with_priority("http://c", 200),
                Source::with_priority("http://a", 100),
                Source::with_priority("http://b", 100),
            ],
        );

        let urls: Vec<&str> = channel.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn test_playable() {
        let empty = Channel::new("ch1", "One", "News", None, vec![]);
        assert!(!empty.is_playable());

        let full = Channel::new("ch2", "Two", "News", None, vec![Source::new("http://a")]);
        assert!(full.is_playable());
    }
}
