//! HTTP surface
//!
//! Routes mirror the playlist/proxy/admin layout players already expect:
//! `/playlist.m3u` for discovery, `/proxy/channel/{id}` for the relayed
//! stream (or a rewritten manifest for HLS channels), `/proxy/segment/{id}`
//! for single-shot segment passthrough, and the `/admin/*` mutation
//! endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::channels::{ChannelRegistry, Source};
use crate::error::Error;
use crate::manifest;
use crate::playlist;
use crate::playlist::m3u::M3U_CONTENT_TYPE;
use crate::relay::{SessionPhase, SessionRegistry};
use crate::upstream::{HttpFetcher, UpstreamFetch};

use super::config::ServerConfig;

/// Shared handler state
pub struct AppState<F> {
    /// Channel and source registry
    pub channels: Arc<ChannelRegistry>,
    /// Active relay sessions
    pub sessions: Arc<SessionRegistry<F>>,
    /// Fetcher used for manifest and segment requests
    pub fetcher: Arc<F>,
    /// Server settings
    pub config: ServerConfig,
}

impl AppState<HttpFetcher> {
    /// Wire up production state from a config
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch));
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: UpstreamFetch> AppState<F> {
    /// Wire up state around an injected fetcher (tests use doubles)
    pub fn with_fetcher(config: ServerConfig, fetcher: Arc<F>) -> Arc<Self> {
        let channels = Arc::new(ChannelRegistry::new());
        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&channels),
            Arc::clone(&fetcher),
            config.relay.clone(),
        ));
        Arc::new(Self {
            channels,
            sessions,
            fetcher,
            config,
        })
    }
}

/// Build the router over shared state
pub fn router<F: UpstreamFetch>(state: Arc<AppState<F>>) -> Router {
    Router::new()
        .route("/", get(index::<F>))
        .route("/playlist.m3u", get(get_playlist::<F>))
        .route("/proxy/channel/{channel_id}", get(proxy_channel::<F>))
        .route("/proxy/segment/{channel_id}", get(proxy_segment::<F>))
        .route("/admin/add_channel_info", post(add_channel_info::<F>))
        .route("/admin/add_source", post(add_source::<F>))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve<F: UpstreamFetch>(state: Arc<AppState<F>>) -> std::io::Result<()> {
    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "IPTV relay listening");
    axum::serve(listener, router(state)).await
}

/// Bind and serve with graceful shutdown
pub async fn serve_until<F, S>(state: Arc<AppState<F>>, shutdown: S) -> std::io::Result<()>
where
    F: UpstreamFetch,
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "IPTV relay listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Deserialize)]
struct PlaylistParams {
    group: Option<String>,
}

#[derive(Deserialize)]
struct SegmentParams {
    url: Option<String>,
}

#[derive(Deserialize)]
struct AddChannelInfoRequest {
    channel_id: String,
    display_name: Option<String>,
    group_title: Option<String>,
    logo_url: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Deserialize)]
struct AddSourceRequest {
    channel_id: String,
    url: String,
    priority: Option<u32>,
}

/// Status page: channel counts and playlist links
async fn index<F: UpstreamFetch>(State(state): State<Arc<AppState<F>>>) -> Html<String> {
    let channels = state.channels.channels(None);
    let mut groups: IndexMap<String, usize> = IndexMap::new();
    for channel in &channels {
        *groups.entry(channel.group.clone()).or_default() += 1;
    }

    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>IPTV Relay</title>\
         <meta charset=\"utf-8\"></head>\n<body>\n<h1>IPTV Relay</h1>\n",
    );
    html.push_str(&format!(
        "<p>Channels: <strong>{}</strong> in <strong>{}</strong> groups</p>\n",
        channels.len(),
        groups.len()
    ));
    html.push_str("<h2>Playlists</h2>\n<ul>\n<li><a href=\"/playlist.m3u\">All channels</a></li>\n");
    for (group, count) in &groups {
        html.push_str(&format!(
            "<li><a href=\"/playlist.m3u?group={}\">{} ({})</a></li>\n",
            utf8_percent_encode(group, NON_ALPHANUMERIC),
            group,
            count
        ));
    }
    html.push_str("</ul>\n</body>\n</html>\n");

    Html(html)
}

/// M3U playlist over the projector; an unknown group yields an empty but
/// valid playlist
async fn get_playlist<F: UpstreamFetch>(
    State(state): State<Arc<AppState<F>>>,
    Query(params): Query<PlaylistParams>,
    headers: HeaderMap,
) -> Response {
    let entries = playlist::project(&state.channels, params.group.as_deref());
    let base = base_url(&state.config, &headers);
    let body = playlist::render_m3u(&entries, &base);

    (
        [(header::CONTENT_TYPE, M3U_CONTENT_TYPE.to_string())],
        body,
    )
        .into_response()
}

/// Relayed channel stream, or a rewritten manifest for HLS channels
async fn proxy_channel<F: UpstreamFetch>(
    State(state): State<Arc<AppState<F>>>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(channel) = state.channels.get(&channel_id) else {
        return not_found(&channel_id);
    };
    if !channel.is_playable() {
        return not_found(&channel_id);
    }

    // HLS channels are served as rewritten manifests per request; the
    // shared relay session path covers raw byte streams.
    if channel
        .sources
        .first()
        .is_some_and(|s| manifest::is_hls_url(&s.url))
    {
        let base = base_url(&state.config, &headers);
        return serve_hls_manifest(&state, &channel_id, &channel.sources, &base).await;
    }

    let mut conn = match state.sessions.attach(&channel_id) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(channel = %channel_id, error = %e, "Attach failed");
            return not_found(&channel_id);
        }
    };

    match conn.ready().await {
        SessionPhase::Streaming { content_type } => (
            StatusCode::OK,
            stream_headers(content_type),
            Body::from_stream(conn.into_stream()),
        )
            .into_response(),
        _ => {
            let err = Error::AllSourcesFailed {
                channel: channel_id.clone(),
            };
            tracing::warn!(channel = %channel_id, "Proxy request failed before first byte");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// Fetch an HLS manifest from the first working source (in failover order)
/// and rewrite its references through the segment route
async fn serve_hls_manifest<F: UpstreamFetch>(
    state: &AppState<F>,
    channel_id: &str,
    sources: &[Source],
    base: &str,
) -> Response {
    let segment_base = format!("{base}/proxy/segment/{channel_id}");
    let read_timeout = state.config.relay.read_timeout;

    for source in sources.iter().filter(|s| manifest::is_hls_url(&s.url)) {
        let fetched = match state.fetcher.fetch(&source.url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    channel = %channel_id,
                    url = %source.url,
                    error = %e,
                    "Manifest fetch failed"
                );
                state.channels.mark_source(channel_id, &source.url, false);
                continue;
            }
        };

        match fetched.collect(read_timeout).await {
            Ok(bytes) => {
                state.channels.mark_source(channel_id, &source.url, true);
                let rewritten = manifest::rewrite_manifest(
                    &String::from_utf8_lossy(&bytes),
                    &source.url,
                    &segment_base,
                );
                return (
                    StatusCode::OK,
                    stream_headers("application/vnd.apple.mpegurl".to_string()),
                    rewritten,
                )
                    .into_response();
            }
            Err(e) => {
                tracing::warn!(
                    channel = %channel_id,
                    url = %source.url,
                    error = %e,
                    "Manifest read failed"
                );
                state.channels.mark_source(channel_id, &source.url, false);
            }
        }
    }

    let err = Error::AllSourcesFailed {
        channel: channel_id.to_string(),
    };
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// Single-shot passthrough of one segment URL
async fn proxy_segment<F: UpstreamFetch>(
    State(state): State<Arc<AppState<F>>>,
    Path(channel_id): Path<String>,
    Query(params): Query<SegmentParams>,
) -> Response {
    let Some(url) = params.url else {
        return validation_error("missing url parameter");
    };
    match url::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return validation_error("invalid segment url"),
    }

    match state.fetcher.fetch(&url).await {
        Ok(fetched) => {
            let content_type = fetched.content_type().to_string();
            let body = Body::from_stream(
                fetched.into_byte_stream(state.config.relay.read_timeout),
            );
            (StatusCode::OK, stream_headers(content_type), body).into_response()
        }
        Err(e) => {
            tracing::warn!(channel = %channel_id, url = %url, error = %e, "Segment fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "segment fetch failed" })),
            )
                .into_response()
        }
    }
}

/// Upsert a channel's metadata (and optionally its source list)
async fn add_channel_info<F: UpstreamFetch>(
    State(state): State<Arc<AppState<F>>>,
    headers: HeaderMap,
    Json(req): Json<AddChannelInfoRequest>,
) -> Response {
    if let Err(denied) = check_admin_key(&state.config, &headers) {
        return denied;
    }

    let channel_id = req.channel_id.trim();
    if channel_id.is_empty() {
        return validation_error("channel_id must not be empty");
    }

    // Omitted fields keep their current values; this endpoint is also how
    // metadata-only updates happen while sources stay untouched.
    let existing = state.channels.get(channel_id);
    let sources = if req.sources.is_empty() {
        existing
            .as_ref()
            .map(|c| c.sources.clone())
            .unwrap_or_default()
    } else {
        req.sources.iter().map(Source::new).collect()
    };
    let display_name = req
        .display_name
        .or_else(|| existing.as_ref().map(|c| c.display_name.clone()))
        .unwrap_or_else(|| channel_id.to_string());
    let group = req
        .group_title
        .or_else(|| existing.as_ref().map(|c| c.group.clone()))
        .unwrap_or_default();
    let logo_url = req
        .logo_url
        .or_else(|| existing.as_ref().and_then(|c| c.logo_url.clone()));

    state
        .channels
        .upsert_channel(channel_id, display_name, group, logo_url, sources);

    Json(json!({ "success": true })).into_response()
}

/// Append a source to an existing channel
async fn add_source<F: UpstreamFetch>(
    State(state): State<Arc<AppState<F>>>,
    headers: HeaderMap,
    Json(req): Json<AddSourceRequest>,
) -> Response {
    if let Err(denied) = check_admin_key(&state.config, &headers) {
        return denied;
    }

    if url::Url::parse(&req.url).is_err() {
        return validation_error("url must be a valid URL");
    }

    let source = Source::with_priority(req.url, req.priority.unwrap_or(Source::DEFAULT_PRIORITY));
    match state.channels.add_source(&req.channel_id, source) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(_) => not_found(&req.channel_id),
    }
}

fn stream_headers(content_type: String) -> [(HeaderName, String); 3] {
    [
        (header::CONTENT_TYPE, content_type),
        (header::CACHE_CONTROL, "no-cache".to_string()),
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
    ]
}

fn base_url(config: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn not_found(channel_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("channel not found: {channel_id}") })),
    )
        .into_response()
}

fn validation_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn check_admin_key(config: &ServerConfig, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &config.admin_key else {
        return Ok(());
    };
    let given = headers.get("x-auth-key").and_then(|v| v.to_str().ok());
    if given != Some(expected.as_str()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response());
    }
    Ok(())
}
