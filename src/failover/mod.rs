//! Source failover
//!
//! One failover pass walks a snapshot of a channel's source list in priority
//! order: `Trying(index)` advances to the next source immediately on failure
//! (a different source failing fast is cheap), wraps around for further
//! passes up to a retry budget with increasing backoff between passes, and
//! ends in `Success` or `Exhausted`. No randomization: failover order is
//! deterministic and testable.
//!
//! The selector works on a snapshot taken at pass start, so admin mutation
//! of the registry never changes a running pass; the next pass re-snapshots.

use std::time::Duration;

use crate::channels::Source;
use crate::upstream::{FetchedStream, UpstreamError, UpstreamFetch};

/// Where a failover pass stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    /// Trying the source at this index in the snapshot
    Trying(usize),
    /// A source produced a live stream
    Success,
    /// Every source failed within the retry budget
    Exhausted,
}

/// Retry policy for one acquisition
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Total full passes over the source list; 1 means no wrap-around
    pub max_passes: u32,

    /// Pause before wrap-around pass `n + 1` is `pass_backoff * n`
    pub pass_backoff: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_passes: 2,
            pass_backoff: Duration::from_secs(1),
        }
    }
}

/// A working upstream, and which source produced it
pub struct FailoverOutcome {
    /// Open, validated stream
    pub stream: FetchedStream,
    /// The source that succeeded
    pub source: Source,
    /// Index of that source in the snapshot
    pub index: usize,
}

/// Failover state machine over one source-list snapshot
pub struct FailoverSelector {
    sources: Vec<Source>,
    config: FailoverConfig,
    state: FailoverState,
}

impl FailoverSelector {
    /// Start a pass at the first source of the snapshot
    pub fn new(sources: Vec<Source>, config: FailoverConfig) -> Self {
        let state = if sources.is_empty() {
            FailoverState::Exhausted
        } else {
            FailoverState::Trying(0)
        };
        Self {
            sources,
            config,
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> FailoverState {
        self.state
    }

    /// Drive the state machine to completion against `fetcher`.
    ///
    /// `on_failure` observes each failed attempt (for health bookkeeping);
    /// per-source errors are consumed here and never surfaced. Returns
    /// `None` once the state machine reaches `Exhausted`.
    pub async fn select<F>(
        &mut self,
        fetcher: &F,
        mut on_failure: impl FnMut(&Source, &UpstreamError),
    ) -> Option<FailoverOutcome>
    where
        F: UpstreamFetch,
    {
        let mut pass = 0u32;

        loop {
            let index = match self.state {
                FailoverState::Trying(index) => index,
                FailoverState::Success | FailoverState::Exhausted => return None,
            };
            let source = &self.sources[index];

            match fetcher.fetch(&source.url).await {
                Ok(stream) => {
                    self.state = FailoverState::Success;
                    tracing::info!(url = %source.url, index, "Upstream source selected");
                    return Some(FailoverOutcome {
                        stream,
                        source: source.clone(),
                        index,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        url = %source.url,
                        index,
                        attempt_pass = pass + 1,
                        error = %e,
                        "Upstream source failed"
                    );
                    on_failure(source, &e);

                    if index + 1 < self.sources.len() {
                        self.state = FailoverState::Trying(index + 1);
                    } else {
                        pass += 1;
                        if pass >= self.config.max_passes {
                            self.state = FailoverState::Exhausted;
                            return None;
                        }
                        tokio::time::sleep(self.config.pass_backoff * pass).await;
                        self.state = FailoverState::Trying(0);
                    }
                }
            }
        }
    }
}
