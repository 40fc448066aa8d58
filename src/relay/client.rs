//! Client-side view of a relay session
//!
//! A [`ClientConnection`] owns one attachment. Dropping it (or the body
//! stream made from it) releases the client from the session registry, so a
//! transport-level disconnect always triggers detach.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::upstream::UpstreamFetch;

use super::chunk::{CloseReason, SessionPhase, StreamChunk};
use super::registry::SessionRegistry;
use super::session::RelaySession;

/// One client attached to a relay session
pub struct ClientConnection<F: UpstreamFetch> {
    pub(super) chunks: BroadcastStream<StreamChunk>,
    pub(super) phase: watch::Receiver<SessionPhase>,
    pub(super) guard: ClientGuard<F>,
}

impl<F: UpstreamFetch> std::fmt::Debug for ClientConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("client_id", &self.guard.client_id)
            .finish()
    }
}

impl<F: UpstreamFetch> ClientConnection<F> {
    /// Id assigned by the session
    pub fn client_id(&self) -> u64 {
        self.guard.client_id
    }

    /// Wait until the session either starts streaming or closes
    pub async fn ready(&mut self) -> SessionPhase {
        match self
            .phase
            .wait_for(|p| !matches!(p, SessionPhase::Connecting))
            .await
        {
            Ok(phase) => phase.clone(),
            // Session dropped without a terminal phase; treat as closed
            Err(_) => SessionPhase::Closed(CloseReason::Finished),
        }
    }

    /// Turn the attachment into a raw byte stream for a response body.
    ///
    /// The stream ends on the session's terminal signal, or when this
    /// client lags so far behind the broadcast that chunks were dropped
    /// (a transport stream with holes is unplayable, so the client is cut
    /// rather than resumed with a gap).
    pub fn into_stream(self) -> ClientStream<F> {
        ClientStream {
            chunks: self.chunks,
            guard: self.guard,
            done: false,
        }
    }
}

/// Releases the client from its exact session instance on drop.
///
/// Holds the `Arc<RelaySession>` rather than a channel id: client ids are
/// per-session, and the registry may already hold a replacement session for
/// the same channel by the time this guard drops.
pub(super) struct ClientGuard<F: UpstreamFetch> {
    pub(super) registry: Arc<SessionRegistry<F>>,
    pub(super) session: Arc<RelaySession>,
    pub(super) client_id: u64,
}

impl<F: UpstreamFetch> Drop for ClientGuard<F> {
    fn drop(&mut self) {
        self.registry.release_session(&self.session, self.client_id);
    }
}

/// Byte stream for one client's HTTP response body
pub struct ClientStream<F: UpstreamFetch> {
    chunks: BroadcastStream<StreamChunk>,
    guard: ClientGuard<F>,
    done: bool,
}

impl<F: UpstreamFetch> Stream for ClientStream<F> {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.chunks).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(StreamChunk::Data(bytes)))) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(Some(Ok(StreamChunk::End(_)))) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                tracing::warn!(
                    channel = %this.guard.session.channel_id(),
                    client_id = this.guard.client_id,
                    skipped,
                    "Client fell behind broadcast, dropping"
                );
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}
