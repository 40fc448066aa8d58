//! Channel registry implementation
//!
//! Thread-safe via a single `RwLock` over an insertion-ordered map. Values
//! are `Arc<Channel>` snapshots: mutation clones the channel, edits the
//! clone, and swaps the `Arc`, so concurrent readers keep a consistent view
//! and a failover pass iterating an old snapshot is never corrupted by an
//! admin write.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};

use super::channel::{Channel, Source};

/// Registry mapping channel ids to source lists and display metadata
pub struct ChannelRegistry {
    channels: RwLock<IndexMap<String, Arc<Channel>>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(IndexMap::new()),
        }
    }

    /// Replace a channel's metadata and source list atomically, creating the
    /// channel if it does not exist. Upsert semantics: no error on overwrite.
    ///
    /// An existing channel keeps its position in the iteration order.
    pub fn upsert_channel(
        &self,
        id: impl Into<String>,
        display_name: impl Into<String>,
        group: impl Into<String>,
        logo_url: Option<String>,
        sources: Vec<Source>,
    ) {
        let channel = Channel::new(id, display_name, group, logo_url, sources);
        let id = channel.id.clone();
        let source_count = channel.sources.len();

        let mut channels = self.channels.write();
        channels.insert(id.clone(), Arc::new(channel));

        tracing::info!(channel = %id, sources = source_count, "Channel upserted");
    }

    /// Append a source to an existing channel, keeping priority order
    pub fn add_source(&self, id: &str, source: Source) -> Result<()> {
        let mut channels = self.channels.write();

        let entry = channels
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut updated = (**entry).clone();
        updated.sources.push(source);
        updated.sources.sort_by_key(|s| s.priority);
        let source_count = updated.sources.len();
        *entry = Arc::new(updated);

        tracing::info!(channel = %id, sources = source_count, "Source added");
        Ok(())
    }

    /// Record the outcome of a fetch attempt against one source.
    ///
    /// Health is advisory metadata; a no-op for unknown channels or URLs
    /// (the source may have been replaced while the attempt was in flight).
    pub fn mark_source(&self, id: &str, url: &str, ok: bool) {
        let mut channels = self.channels.write();

        if let Some(entry) = channels.get_mut(id) {
            let mut updated = (**entry).clone();
            let mut touched = false;
            for source in &mut updated.sources {
                if source.url == url {
                    source.healthy = ok;
                    source.last_checked = Some(Instant::now());
                    touched = true;
                }
            }
            if touched {
                *entry = Arc::new(updated);
            }
        }
    }

    /// Snapshot of one channel
    pub fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.read().get(id).cloned()
    }

    /// Snapshot of one channel's source list, in failover order
    pub fn sources(&self, id: &str) -> Option<Vec<Source>> {
        self.channels.read().get(id).map(|c| c.sources.clone())
    }

    /// Snapshot of all channels, in insertion order, optionally filtered by
    /// group equality. Registry growth after the call never changes the
    /// returned snapshot.
    pub fn channels(&self, group: Option<&str>) -> Vec<Arc<Channel>> {
        self.channels
            .read()
            .values()
            .filter(|c| group.is_none_or(|g| c.group == g))
            .cloned()
            .collect()
    }

    /// Whether a channel id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.channels.read().contains_key(id)
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_and_overwrites() {
        let registry = ChannelRegistry::new();

        registry.upsert_channel("ch1", "One", "News", None, vec![Source::new("http://a")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ch1").unwrap().display_name, "One");

        registry.upsert_channel("ch1", "One HD", "News", None, vec![Source::new("http://b")]);
        assert_eq!(registry.len(), 1);

        let channel = registry.get("ch1").unwrap();
        assert_eq!(channel.display_name, "One HD");
        assert_eq!(channel.sources[0].url, "http://b");
    }

    #[test]
    fn test_overwrite_keeps_insertion_order() {
        let registry = ChannelRegistry::new();
        registry.upsert_channel("ch1", "One", "News", None, vec![]);
        registry.upsert_channel("ch2", "Two", "News", None, vec![]);
        registry.upsert_channel("ch1", "One HD", "News", None, vec![]);

        let ids: Vec<String> = registry
            .channels(None)
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["ch1", "ch2"]);
    }

    #[test]
    fn test_add_source_unknown_channel() {
        let registry = ChannelRegistry::new();
        let result = registry.add_source("nope", Source::new("http://a"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_add_source_keeps_priority_order() {
        let registry = ChannelRegistry::new();
        registry.upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::with_priority("http://b", 100)],
        );

        registry
            .add_source("ch1", Source::with_priority("http://a", 50))
            .unwrap();
        registry
            .add_source("ch1", Source::with_priority("http://c", 100))
            .unwrap();

        let urls: Vec<String> = registry
            .sources("ch1")
            .unwrap()
            .iter()
            .map(|s| s.url.clone())
            .collect();
        assert_eq!(urls, vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn test_group_filter() {
        let registry = ChannelRegistry::new();
        registry.upsert_channel("ch1", "One", "News", None, vec![]);
        registry.upsert_channel("ch2", "Two", "Sports", None, vec![]);

        assert_eq!(registry.channels(Some("News")).len(), 1);
        assert_eq!(registry.channels(Some("Sports")).len(), 1);
        assert_eq!(registry.channels(Some("Movies")).len(), 0);
        assert_eq!(registry.channels(None).len(), 2);
    }

    #[test]
    fn test_snapshot_isolation() {
        let registry = ChannelRegistry::new();
        registry.upsert_channel("ch1", "One", "News", None, vec![Source::new("http://a")]);

        let snapshot = registry.sources("ch1").unwrap();
        registry
            .add_source("ch1", Source::new("http://b"))
            .unwrap();

        // The snapshot taken before the mutation is unchanged; a fresh read
        // sees the new source.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.sources("ch1").unwrap().len(), 2);
    }

    #[test]
    fn test_mark_source() {
        let registry = ChannelRegistry::new();
        registry.upsert_channel("ch1", "One", "News", None, vec![Source::new("http://a")]);

        registry.mark_source("ch1", "http://a", false);
        let source = &registry.sources("ch1").unwrap()[0];
        assert!(!source.healthy);
        assert!(source.last_checked.is_some());

        // Unknown channel or url is a no-op
        registry.mark_source("ch1", "http://zzz", false);
        registry.mark_source("nope", "http://a", false);
    }
}
