//! Offline playlist converter
//!
//! Rewrites an external M3U playlist so every channel points at a local
//! relay instead of the original upstream URLs, merging duplicate channel
//! ids into one proxied entry.
//!
//! Run with: cargo run --example import_playlist INPUT.m3u [PROXY_URL]
//!
//! Examples:
//!   cargo run --example import_playlist channels.m3u > proxied.m3u
//!   cargo run --example import_playlist channels.m3u http://tv.lan:5000 > proxied.m3u

use iptv_relay::playlist::{import_m3u, project, render_m3u};
use iptv_relay::ChannelRegistry;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let Some(input) = args.get(1) else {
        eprintln!("Usage: import_playlist INPUT.m3u [PROXY_URL]");
        std::process::exit(1);
    };
    let proxy_url = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "http://localhost:5000".to_string());

    let content = std::fs::read_to_string(input)?;

    let registry = ChannelRegistry::new();
    let imported = import_m3u(&registry, &content);
    eprintln!("Imported {} channels from {}", imported, input);

    let entries = project(&registry, None);
    print!("{}", render_m3u(&entries, &proxy_url));

    Ok(())
}
