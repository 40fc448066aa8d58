//! Per-channel relay session state
//!
//! A session is the single point of upstream consumption for one channel,
//! fanned out to every attached client over a bounded broadcast channel.
//! Clients join at the live edge: a receiver subscribed now sees only chunks
//! broadcast after this moment, never a replay.
//!
//! The phase watch is monotone from a client's point of view: `Connecting`
//! moves to `Streaming` on the first acquisition and then never changes
//! (mid-stream termination is delivered in-band as [`StreamChunk::End`]);
//! only a session that dies before its first byte reports `Closed` through
//! the phase. That keeps "did streaming ever start" unambiguous even when
//! a watch reader observes state late.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::chunk::{CloseReason, SessionPhase, StreamChunk};

/// Shared state for one channel's relay
pub struct RelaySession {
    channel_id: String,

    /// Fan-out to subscribers; bounded, laggards are dropped
    tx: broadcast::Sender<StreamChunk>,

    /// Lifecycle signal for clients waiting to start their response
    phase: watch::Sender<SessionPhase>,

    /// Terminal flag for the registry's replace-on-attach check
    closed: AtomicBool,

    /// Ids of currently attached clients
    clients: Mutex<HashSet<u64>>,

    next_client_id: AtomicU64,

    /// Cancelling stops the pump task and closes the upstream
    cancel: CancellationToken,
}

impl RelaySession {
    pub(super) fn new(channel_id: impl Into<String>, broadcast_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(broadcast_capacity);
        let (phase, _) = watch::channel(SessionPhase::Connecting);

        Self {
            channel_id: channel_id.into(),
            tx,
            phase,
            closed: AtomicBool::new(false),
            clients: Mutex::new(HashSet::new()),
            next_client_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Channel this session serves
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Register a new client at the live edge
    pub(super) fn attach(&self) -> AttachedClient {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.clients.lock();
        clients.insert(id);

        tracing::debug!(
            channel = %self.channel_id,
            client_id = id,
            clients = clients.len(),
            "Client attached"
        );

        AttachedClient {
            id,
            chunks: self.tx.subscribe(),
            phase: self.phase.subscribe(),
        }
    }

    /// Remove a client. Idempotent: `None` when the id was not attached,
    /// otherwise `Some(now_empty)`. Only an actual removal may report
    /// emptiness, so a double detach can never trigger a second teardown.
    pub(super) fn detach(&self, client_id: u64) -> Option<bool> {
        let mut clients = self.clients.lock();

        if !clients.remove(&client_id) {
            return None;
        }

        tracing::debug!(
            channel = %self.channel_id,
            client_id,
            clients = clients.len(),
            "Client detached"
        );

        Some(clients.is_empty())
    }

    /// Number of attached clients
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Current lifecycle phase as clients observe it
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Whether the session has terminated (regardless of phase)
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// First acquisition succeeded; later failover successes keep the
    /// original phase (response headers are already out).
    pub(super) fn mark_streaming(&self, content_type: &str) {
        self.phase.send_if_modified(|phase| {
            if matches!(phase, SessionPhase::Connecting) {
                *phase = SessionPhase::Streaming {
                    content_type: content_type.to_string(),
                };
                true
            } else {
                false
            }
        });
    }

    /// Terminal: set the closed flag, and report `Closed` through the phase
    /// only if streaming never started.
    pub(super) fn mark_closed(&self, reason: CloseReason) {
        self.closed.store(true, Ordering::Release);
        self.phase.send_if_modified(|phase| {
            if matches!(phase, SessionPhase::Connecting) {
                *phase = SessionPhase::Closed(reason);
                true
            } else {
                false
            }
        });
    }

    /// Broadcast a chunk; returns the number of receivers it reached
    pub(super) fn broadcast(&self, chunk: StreamChunk) -> usize {
        self.tx.send(chunk).unwrap_or(0)
    }

    pub(super) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// What a freshly attached client holds
pub(super) struct AttachedClient {
    pub(super) id: u64,
    pub(super) chunks: broadcast::Receiver<StreamChunk>,
    pub(super) phase: watch::Receiver<SessionPhase>,
}
