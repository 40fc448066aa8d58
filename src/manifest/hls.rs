//! HLS manifest rewriting

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Everything except unreserved characters, for query parameter values
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Whether a source URL points at an HLS manifest rather than a raw stream
pub fn is_hls_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().ends_with(".m3u8"),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).ends_with(".m3u8"),
    }
}

/// Rewrite a manifest so segment and `URI="..."` references proxy through
/// `segment_base` (e.g. `http://host/proxy/segment/ch1`). Relative
/// references are resolved against `source_url` first.
pub fn rewrite_manifest(manifest: &str, source_url: &str, segment_base: &str) -> String {
    let base = Url::parse(source_url).ok();
    let mut output = String::with_capacity(manifest.len());

    for line in manifest.lines() {
        if line.starts_with('#') {
            output.push_str(&rewrite_uri_attribute(line, base.as_ref(), segment_base));
        } else {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                output.push_str(line);
            } else {
                output.push_str(&proxied(trimmed, base.as_ref(), segment_base));
            }
        }
        output.push('\n');
    }

    output
}

fn proxied(reference: &str, base: Option<&Url>, segment_base: &str) -> String {
    let absolute = make_absolute(reference, base);
    format!(
        "{}?url={}",
        segment_base,
        utf8_percent_encode(&absolute, QUERY_VALUE)
    )
}

/// Resolve a possibly-relative reference against the manifest's own URL
fn make_absolute(raw: &str, base: Option<&Url>) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(base) = base {
        if let Ok(joined) = base.join(raw) {
            return joined.to_string();
        }
    }
    raw.to_string()
}

/// Rewrite any `URI="..."` values found in a tag line (encryption keys,
/// media playlists in master manifests)
fn rewrite_uri_attribute(line: &str, base: Option<&Url>, segment_base: &str) -> String {
    let pattern = "URI=\"";
    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = remaining.find(pattern) {
        result.push_str(&remaining[..start + pattern.len()]);
        remaining = &remaining[start + pattern.len()..];

        if let Some(end) = remaining.find('"') {
            result.push_str(&proxied(&remaining[..end], base, segment_base));
            result.push('"');
            remaining = &remaining[end + 1..];
        } else {
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}
