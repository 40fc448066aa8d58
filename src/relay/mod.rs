//! Relay engine: shared upstream sessions fanned out to many clients
//!
//! One relay session per channel owns the single upstream connection and
//! broadcasts its bytes to every attached client, so a popular channel opens
//! one upstream fetch regardless of client count.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<SessionRegistry>
//!                  ┌────────────────────────────┐
//!                  │ sessions: HashMap<Channel, │
//!                  │   Arc<RelaySession> {      │
//!                  │     tx: broadcast::Tx,     │
//!                  │     phase: watch::Tx,      │
//!                  │   }                        │
//!                  │ >                          │
//!                  └────────────┬───────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!     [pump task]          [client]             [client]
//!     failover +           chunks.recv()        chunks.recv()
//!     next_chunk()              │                    │
//!          └──► broadcast() ────┴──► HTTP body ──► socket
//! ```
//!
//! # Zero-copy design
//!
//! `bytes::Bytes` is reference counted, so every subscriber of the broadcast
//! shares one allocation per chunk; the channel clones only the handle.

pub mod chunk;
pub mod client;
pub mod registry;
pub mod session;

pub use chunk::{CloseReason, SessionPhase, StreamChunk};
pub use client::{ClientConnection, ClientStream};
pub use registry::{RelayConfig, SessionRegistry};
pub use session::RelaySession;
