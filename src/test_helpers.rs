//! Shared test doubles
//!
//! [`ScriptedFetcher`] stands in for the network: each URL is given a queue
//! of scripted behaviors (fail, serve fixed chunks, serve pushed chunks).
//! The last cloneable behavior in a queue is sticky, so "always fails" and
//! "serves once, then fails" are both expressible. Every call is counted
//! and ordered for assertions about failover determinism and fetch sharing.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::upstream::{FetchedStream, UpstreamError, UpstreamFetch};

const TEST_CONTENT_TYPE: &str = "video/MP2T";

enum Script {
    Fail(UpstreamError),
    Serve {
        chunks: Vec<Bytes>,
        hold_open: bool,
    },
    ServePush(mpsc::UnboundedReceiver<Bytes>),
}

/// Scripted [`UpstreamFetch`] double
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    /// Next fetch of `url` fails with a connection error
    pub fn fail(&self, url: &str) {
        self.fail_with(url, UpstreamError::ConnectRefused("scripted".into()));
    }

    /// Next fetch of `url` fails with the given error
    pub fn fail_with(&self, url: &str, error: UpstreamError) {
        self.push(url, Script::Fail(error));
    }

    /// Serve the chunks, then keep the stream open (a live feed)
    pub fn serve(&self, url: &str, chunks: Vec<Bytes>) {
        self.push(
            url,
            Script::Serve {
                chunks,
                hold_open: true,
            },
        );
    }

    /// Serve the chunks, then end the stream (upstream EOF)
    pub fn serve_finite(&self, url: &str, chunks: Vec<Bytes>) {
        self.push(
            url,
            Script::Serve {
                chunks,
                hold_open: false,
            },
        );
    }

    /// Serve chunks pushed through the returned sender; dropping the sender
    /// ends the stream (upstream EOF)
    pub fn serve_push(&self, url: &str) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(url, Script::ServePush(rx));
        tx
    }

    /// Total fetch calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs fetched, in call order
    pub fn order(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    fn next_script(&self, url: &str) -> Script {
        let mut scripts = self.scripts.lock();
        let Some(queue) = scripts.get_mut(url) else {
            return Script::Fail(UpstreamError::ConnectRefused(format!("unscripted: {url}")));
        };

        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }

        // Sticky last behavior, unless it is single-use
        match queue.front() {
            Some(Script::Fail(e)) => Script::Fail(e.clone()),
            Some(Script::Serve { chunks, hold_open }) => Script::Serve {
                chunks: chunks.clone(),
                hold_open: *hold_open,
            },
            Some(Script::ServePush(_)) => queue.pop_front().unwrap(),
            None => Script::Fail(UpstreamError::ConnectRefused(format!(
                "script exhausted: {url}"
            ))),
        }
    }
}

impl UpstreamFetch for ScriptedFetcher {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FetchedStream, UpstreamError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().push(url.to_string());
        let script = self.next_script(url);

        async move {
            match script {
                Script::Fail(e) => Err(e),
                Script::Serve { chunks, hold_open } => {
                    let served = futures::stream::iter(chunks.into_iter().map(Ok));
                    let stream = if hold_open {
                        served.chain(futures::stream::pending()).boxed()
                    } else {
                        served.boxed()
                    };
                    Ok(FetchedStream::new(TEST_CONTENT_TYPE, stream))
                }
                Script::ServePush(rx) => Ok(FetchedStream::new(
                    TEST_CONTENT_TYPE,
                    UnboundedReceiverStream::new(rx).map(Ok).boxed(),
                )),
            }
        }
    }
}
