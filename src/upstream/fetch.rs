//! HTTP upstream fetcher
//!
//! reqwest-backed implementation of [`UpstreamFetch`]. Sources are fetched
//! with a browser-like `User-Agent` and a `Referer` derived from the source
//! URL, since many IPTV upstreams reject obviously non-browser clients.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};

use super::error::UpstreamError;

/// User agent presented to upstreams unless overridden
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/134.0.0.0 Safari/537.36";

/// Content type assumed for raw live streams when nothing better is known
const DEFAULT_STREAM_CONTENT_TYPE: &str = "video/MP2T";

/// Seam between the relay engine and the network.
///
/// Implemented by [`HttpFetcher`] in production and by scripted doubles in
/// tests (fetch-call counters, forced failures).
pub trait UpstreamFetch: Send + Sync + 'static {
    /// Open one candidate source and validate it carries a live stream
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FetchedStream, UpstreamError>> + Send;
}

/// An open, validated upstream byte stream.
///
/// Dropping the stream releases the underlying connection.
pub struct FetchedStream {
    content_type: String,
    chunks: BoxStream<'static, Result<Bytes, UpstreamError>>,
}

impl FetchedStream {
    /// Wrap a raw chunk stream with its content type
    pub fn new(
        content_type: impl Into<String>,
        chunks: BoxStream<'static, Result<Bytes, UpstreamError>>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            chunks,
        }
    }

    /// Content type the relayed response should carry
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Next chunk, bounded by `timeout`. `Ok(None)` is end of stream; a
    /// read that produces no bytes within the timeout fails with
    /// [`UpstreamError::ReadTimeout`] instead of blocking the caller.
    pub async fn next_chunk(&mut self, timeout: Duration) -> Result<Option<Bytes>, UpstreamError> {
        match tokio::time::timeout(timeout, self.chunks.next()).await {
            Err(_) => Err(UpstreamError::ReadTimeout),
            Ok(None) => Ok(None),
            Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
            Ok(Some(Err(e))) => Err(e),
        }
    }

    /// Read the whole remaining stream into memory, e.g. for manifests.
    /// `timeout` bounds each individual read, not the total.
    pub async fn collect(mut self, timeout: Duration) -> Result<Bytes, UpstreamError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next_chunk(timeout).await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }

    /// Adapt into a plain byte stream that ends on EOF or any read error,
    /// suitable for an HTTP response body.
    pub fn into_byte_stream(
        self,
        timeout: Duration,
    ) -> impl futures::Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static {
        futures::stream::unfold(Some(self), move |state| async move {
            let mut stream = state?;
            match stream.next_chunk(timeout).await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl std::fmt::Debug for FetchedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Connect timeout per attempt
    pub connect_timeout: Duration,

    /// User agent presented to upstreams
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// reqwest-backed upstream fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher; the underlying client pools connections across
    /// sources.
    pub fn new(config: &FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl UpstreamFetch for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FetchedStream, UpstreamError>> + Send {
        let request = url::Url::parse(url)
            .map_err(|e| UpstreamError::BadUrl(e.to_string()))
            .map(|parsed| {
                let referer = format!(
                    "{}://{}/",
                    parsed.scheme(),
                    parsed.host_str().unwrap_or_default()
                );
                (self.client.get(url).header(REFERER, referer), parsed)
            });

        async move {
            let (request, parsed) = request?;

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => return Err(classify_send_error(&e)),
            };

            let status = response.status();
            let header_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            if !status.is_success() || is_non_stream(&header_type) {
                return Err(UpstreamError::NonStreamResponse {
                    status: status.as_u16(),
                    content_type: header_type,
                });
            }

            let content_type = content_type_for(parsed.path(), &header_type);
            let chunks = response
                .bytes_stream()
                .map(|r| r.map_err(|e| UpstreamError::ReadError(e.to_string())))
                .boxed();

            Ok(FetchedStream::new(content_type, chunks))
        }
    }
}

fn classify_send_error(e: &reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::ConnectTimeout
    } else if e.is_connect() {
        UpstreamError::ConnectRefused(e.to_string())
    } else {
        UpstreamError::ReadError(e.to_string())
    }
}

/// An HTML page is an upstream error page, never stream data. Text-like
/// types other than HTML are allowed through: HLS manifests are regularly
/// served as `text/plain`.
fn is_non_stream(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/html") || ct.starts_with("application/xhtml")
}

/// Content type by URL suffix first, then the response header, then the
/// raw-stream default.
fn content_type_for(path: &str, header_type: &str) -> String {
    let suffix_type = if path.ends_with(".m3u8") {
        Some("application/vnd.apple.mpegurl")
    } else if path.ends_with(".mpd") {
        Some("application/dash+xml")
    } else if path.ends_with(".flv") {
        Some("video/x-flv")
    } else if path.ends_with(".mp4") {
        Some("video/mp4")
    } else if path.ends_with(".ts") {
        Some(DEFAULT_STREAM_CONTENT_TYPE)
    } else {
        None
    };

    if let Some(t) = suffix_type {
        return t.to_string();
    }
    if !header_type.is_empty() {
        return header_type.to_string();
    }
    DEFAULT_STREAM_CONTENT_TYPE.to_string()
}
