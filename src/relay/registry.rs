//! Session registry and relay pump
//!
//! Process-wide table of active relay sessions, one per channel. The
//! get-or-create path and every detach run under a single table lock, which
//! is what enforces the invariants: at most one session (and therefore at
//! most one upstream fetch) per channel at any instant, and teardown exactly
//! once, when the last client leaves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_stream::wrappers::BroadcastStream;

use crate::channels::ChannelRegistry;
use crate::error::{Error, Result};
use crate::failover::{FailoverConfig, FailoverSelector};
use crate::upstream::UpstreamFetch;

use super::chunk::{CloseReason, StreamChunk};
use super::client::{ClientConnection, ClientGuard};
use super::session::RelaySession;

/// Relay tuning knobs
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broadcast capacity in chunks; clients lagging past this are dropped
    pub broadcast_capacity: usize,

    /// Per-chunk upstream read timeout
    pub read_timeout: Duration,

    /// Failover policy for each acquisition pass
    pub failover: FailoverConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            read_timeout: Duration::from_secs(15),
            failover: FailoverConfig::default(),
        }
    }
}

/// Table of active relay sessions keyed by channel id
pub struct SessionRegistry<F> {
    channels: Arc<ChannelRegistry>,
    fetcher: Arc<F>,
    sessions: Mutex<HashMap<String, Arc<RelaySession>>>,
    config: RelayConfig,
}

impl<F: UpstreamFetch> SessionRegistry<F> {
    /// Create a registry serving channels from `channels` via `fetcher`
    pub fn new(channels: Arc<ChannelRegistry>, fetcher: Arc<F>, config: RelayConfig) -> Self {
        Self {
            channels,
            fetcher,
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The channel registry sessions are validated against
    pub fn channel_registry(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    /// Attach a client to the channel's relay session, creating the session
    /// if none is live.
    ///
    /// Fails with `NotFound` for an unknown channel or one with no
    /// registered sources; in both cases no upstream fetch is attempted.
    pub fn attach(self: &Arc<Self>, channel_id: &str) -> Result<ClientConnection<F>> {
        let channel = self
            .channels
            .get(channel_id)
            .ok_or_else(|| Error::NotFound(channel_id.to_string()))?;
        if !channel.is_playable() {
            return Err(Error::NotFound(channel_id.to_string()));
        }

        let mut sessions = self.sessions.lock();

        let (session, created) = match sessions.get(channel_id) {
            Some(existing) if !existing.is_closed() => (Arc::clone(existing), false),
            _ => {
                let session = Arc::new(RelaySession::new(
                    channel_id,
                    self.config.broadcast_capacity,
                ));
                sessions.insert(channel_id.to_string(), Arc::clone(&session));
                tracing::info!(channel = %channel_id, "Relay session created");
                (session, true)
            }
        };

        // Subscribe before the pump can run, so the creating client's join
        // point is its attach time
        let attached = session.attach();
        if created {
            tokio::spawn(run_relay(Arc::clone(self), Arc::clone(&session)));
        }

        Ok(ClientConnection {
            chunks: BroadcastStream::new(attached.chunks),
            phase: attached.phase,
            guard: ClientGuard {
                registry: Arc::clone(self),
                session,
                client_id: attached.id,
            },
        })
    }

    /// Detach a client from the channel's current session. Idempotent.
    pub fn release(&self, channel_id: &str, client_id: u64) {
        let session = self.sessions.lock().get(channel_id).map(Arc::clone);
        if let Some(session) = session {
            self.release_session(&session, client_id);
        }
    }

    /// Detach a client from its exact session instance; tears the session
    /// down when the last client leaves. Idempotent per client id.
    pub(super) fn release_session(&self, session: &Arc<RelaySession>, client_id: u64) {
        let mut sessions = self.sessions.lock();

        // Only a detach that actually removed the id may trigger teardown,
        // so a double release can never tear down twice.
        if session.detach(client_id) != Some(true) {
            return;
        }

        if let Some(current) = sessions.get(session.channel_id()) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(session.channel_id());
            }
        }
        drop(sessions);

        session.cancel();
        tracing::info!(channel = %session.channel_id(), "Last client left, session torn down");
    }

    /// Terminal bookkeeping for a finished pump: publish the closed state
    /// and drop the table entry, atomically with respect to attach.
    fn close_session(&self, session: &Arc<RelaySession>, reason: CloseReason) {
        let mut sessions = self.sessions.lock();
        session.mark_closed(reason);
        if let Some(current) = sessions.get(session.channel_id()) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(session.channel_id());
            }
        }
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Number of clients attached to a channel's session
    pub fn client_count(&self, channel_id: &str) -> usize {
        self.sessions
            .lock()
            .get(channel_id)
            .map_or(0, |s| s.client_count())
    }
}

/// Drive one session: acquire an upstream via failover, pump its bytes into
/// the broadcast, fail over on read errors, until cancellation or
/// exhaustion.
async fn run_relay<F: UpstreamFetch>(registry: Arc<SessionRegistry<F>>, session: Arc<RelaySession>) {
    let cancel = session.cancel_token();

    let reason = tokio::select! {
        _ = cancel.cancelled() => CloseReason::Finished,
        reason = pump(&registry, &session) => reason,
    };

    if reason == CloseReason::SourcesExhausted {
        // Terminal signal for everyone attached; new clients observe the
        // closed phase instead.
        session.broadcast(StreamChunk::End(reason));
    }

    registry.close_session(&session, reason);
    tracing::info!(channel = %session.channel_id(), reason = ?reason, "Relay session closed");
}

async fn pump<F: UpstreamFetch>(
    registry: &SessionRegistry<F>,
    session: &RelaySession,
) -> CloseReason {
    let channel_id = session.channel_id();
    let channels = &registry.channels;

    loop {
        // Fresh snapshot per acquisition pass: sources the admin added or
        // removed since the last pass apply from here on.
        let sources = channels.sources(channel_id).unwrap_or_default();
        let mut selector = FailoverSelector::new(sources, registry.config.failover.clone());

        let outcome = selector
            .select(registry.fetcher.as_ref(), |source, _| {
                channels.mark_source(channel_id, &source.url, false);
            })
            .await;

        let Some(outcome) = outcome else {
            tracing::warn!(channel = %channel_id, "Failover exhausted all sources");
            return CloseReason::SourcesExhausted;
        };

        channels.mark_source(channel_id, &outcome.source.url, true);
        session.mark_streaming(outcome.stream.content_type());

        let mut stream = outcome.stream;
        loop {
            match stream.next_chunk(registry.config.read_timeout).await {
                Ok(Some(chunk)) => {
                    // Zero receivers is not an error: teardown is driven by
                    // release/cancel, and a client may join any moment.
                    let _ = session.broadcast(StreamChunk::Data(chunk));
                }
                Ok(None) => {
                    tracing::warn!(
                        channel = %channel_id,
                        url = %outcome.source.url,
                        "Upstream ended, failing over"
                    );
                    channels.mark_source(channel_id, &outcome.source.url, false);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %channel_id,
                        url = %outcome.source.url,
                        error = %e,
                        "Upstream read failed, failing over"
                    );
                    channels.mark_source(channel_id, &outcome.source.url, false);
                    break;
                }
            }
        }
        // The dead upstream stream drops here, releasing its connection
        // before the next acquisition starts.
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::channels::Source;
    use crate::relay::chunk::SessionPhase;
    use crate::test_helpers::ScriptedFetcher;

    fn quick_config() -> RelayConfig {
        RelayConfig {
            broadcast_capacity: 16,
            read_timeout: Duration::from_secs(5),
            failover: FailoverConfig {
                max_passes: 1,
                pass_backoff: Duration::from_millis(1),
            },
        }
    }

    fn setup(fetcher: ScriptedFetcher) -> Arc<SessionRegistry<ScriptedFetcher>> {
        let channels = Arc::new(ChannelRegistry::new());
        Arc::new(SessionRegistry::new(
            channels,
            Arc::new(fetcher),
            quick_config(),
        ))
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let registry = setup(ScriptedFetcher::new());

        let err = registry.attach("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_source_list_is_not_found_without_fetching() {
        let fetcher = ScriptedFetcher::new();
        let registry = setup(fetcher);
        registry
            .channel_registry()
            .upsert_channel("ch1", "One", "News", None, vec![]);

        let err = registry.attach("ch1").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(registry.fetcher.calls(), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_clients_share_one_upstream_fetch() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("http://up/a", vec![Bytes::from_static(b"live")]);

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a")],
        );

        let mut connections = Vec::new();
        for _ in 0..8 {
            connections.push(registry.attach("ch1").unwrap());
        }

        for conn in &mut connections {
            assert!(matches!(
                conn.ready().await,
                SessionPhase::Streaming { .. }
            ));
        }

        assert_eq!(registry.fetcher.calls(), 1);
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.client_count("ch1"), 8);

        // Dropping every connection tears the session down
        drop(connections);
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.client_count("ch1"), 0);
    }

    #[tokio::test]
    async fn test_failover_reaches_third_source_and_streams_its_bytes() {
        let fetcher = ScriptedFetcher::new();
        fetcher.fail("http://up/a");
        fetcher.fail("http://up/b");
        fetcher.serve("http://up/c", vec![Bytes::from_static(b"c-bytes")]);

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![
                Source::new("http://up/a"),
                Source::new("http://up/b"),
                Source::new("http://up/c"),
            ],
        );

        let mut conn = registry.attach("ch1").unwrap();
        assert!(matches!(conn.ready().await, SessionPhase::Streaming { .. }));

        let mut body = conn.into_stream();
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"c-bytes");

        assert_eq!(
            registry.fetcher.order(),
            vec!["http://up/a", "http://up/b", "http://up/c"]
        );

        // Health bookkeeping followed the attempts
        let sources = registry.channel_registry().sources("ch1").unwrap();
        assert!(!sources[0].healthy);
        assert!(!sources[1].healthy);
        assert!(sources[2].healthy);
    }

    #[tokio::test]
    async fn test_exhaustion_signals_all_clients_and_removes_session() {
        let fetcher = ScriptedFetcher::new();
        fetcher.fail("http://up/a");
        fetcher.fail("http://up/b");

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a"), Source::new("http://up/b")],
        );

        let mut first = registry.attach("ch1").unwrap();
        let mut second = registry.attach("ch1").unwrap();

        assert_eq!(
            first.ready().await,
            SessionPhase::Closed(CloseReason::SourcesExhausted)
        );
        assert_eq!(
            second.ready().await,
            SessionPhase::Closed(CloseReason::SourcesExhausted)
        );

        // Both clients observe terminal closure, not a hang
        let collected: Vec<_> = first.into_stream().collect().await;
        assert!(collected.is_empty());
        let collected: Vec<_> = second.into_stream().collect().await;
        assert!(collected.is_empty());

        assert_eq!(registry.session_count(), 0);
        // Budget 1, two sources: one attempt each
        assert_eq!(registry.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("http://up/a", vec![]);

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a")],
        );

        let conn = registry.attach("ch1").unwrap();
        let client_id = conn.client_id();

        registry.release("ch1", client_id);
        assert_eq!(registry.session_count(), 0);

        // Second release of the same handle: no error, no duplicate teardown
        registry.release("ch1", client_id);
        assert_eq!(registry.session_count(), 0);

        // The guard drop after an explicit release is also a no-op
        drop(conn);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_late_joiner_starts_at_live_edge() {
        let fetcher = ScriptedFetcher::new();
        let push = fetcher.serve_push("http://up/a");

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a")],
        );

        let mut first = registry.attach("ch1").unwrap();
        assert!(matches!(first.ready().await, SessionPhase::Streaming { .. }));
        let mut first_body = first.into_stream();

        push.send(Bytes::from_static(b"one")).unwrap();
        let chunk = first_body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"one");

        // "one" has been broadcast; a client attaching now must not see it
        let second = registry.attach("ch1").unwrap();
        let mut second_body = second.into_stream();

        push.send(Bytes::from_static(b"two")).unwrap();

        let chunk = first_body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"two");
        let chunk = second_body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"two");
    }

    #[tokio::test]
    async fn test_mid_stream_failover_keeps_clients_and_resnapshot_sees_new_source() {
        let fetcher = ScriptedFetcher::new();
        let push_a = fetcher.serve_push("http://up/a");
        fetcher.fail("http://up/a");
        let push_b = fetcher.serve_push("http://up/b");

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a")],
        );

        let mut conn = registry.attach("ch1").unwrap();
        assert!(matches!(conn.ready().await, SessionPhase::Streaming { .. }));
        let mut body = conn.into_stream();

        push_a.send(Bytes::from_static(b"a1")).unwrap();
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"a1");

        // Admin registers a second source while the stream is live
        registry
            .channel_registry()
            .add_source("ch1", Source::new("http://up/b"))
            .unwrap();

        // Upstream A dies; the next failover pass re-snapshots the registry,
        // finds B, and the already-attached client keeps receiving.
        drop(push_a);
        push_b.send(Bytes::from_static(b"b1")).unwrap();

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"b1");

        assert_eq!(
            registry.fetcher.order(),
            vec!["http://up/a", "http://up/a", "http://up/b"]
        );
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_new_session_after_teardown() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("http://up/a", vec![Bytes::from_static(b"x")]);

        let registry = setup(fetcher);
        registry.channel_registry().upsert_channel(
            "ch1",
            "One",
            "News",
            None,
            vec![Source::new("http://up/a")],
        );

        let mut first = registry.attach("ch1").unwrap();
        assert!(matches!(first.ready().await, SessionPhase::Streaming { .. }));
        drop(first);
        assert_eq!(registry.session_count(), 0);

        // A later request gets a fresh session and a fresh fetch
        let mut second = registry.attach("ch1").unwrap();
        assert!(matches!(
            second.ready().await,
            SessionPhase::Streaming { .. }
        ));
        assert_eq!(registry.fetcher.calls(), 2);
    }
}
