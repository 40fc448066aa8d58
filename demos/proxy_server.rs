//! IPTV relay server demo
//!
//! Run with: cargo run --example proxy_server [BIND_ADDR] [OPTIONS]
//!
//! Examples:
//!   cargo run --example proxy_server                          # binds to 0.0.0.0:5000
//!   cargo run --example proxy_server localhost:5050
//!   cargo run --example proxy_server 0.0.0.0:5000 --import channels.m3u
//!   cargo run --example proxy_server 0.0.0.0:5000 --admin-key s3cret
//!
//! Then point a player at the playlist:
//!   vlc http://localhost:5000/playlist.m3u
//!
//! And manage channels over the admin endpoints:
//!   curl -X POST http://localhost:5000/admin/add_channel_info \
//!     -H 'Content-Type: application/json' \
//!     -d '{"channel_id":"cctv1","display_name":"CCTV-1","group_title":"央视","sources":["http://upstream/cctv1.ts"]}'

use std::net::SocketAddr;

use iptv_relay::playlist::import_m3u;
use iptv_relay::{AppState, ServerConfig};

/// Accepts "IP:PORT", a bare IP (port defaults to 5000), or "localhost"
/// in either form.
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 5000;

    let normalized = arg.replace("localhost", "127.0.0.1");

    normalized
        .parse::<SocketAddr>()
        .or_else(|_| {
            normalized
                .parse::<std::net::IpAddr>()
                .map(|ip| SocketAddr::new(ip, DEFAULT_PORT))
        })
        .map_err(|_| format!("invalid bind address '{arg}', expected IP:PORT or IP"))
}

fn print_usage() {
    eprintln!("Usage: proxy_server [BIND_ADDR] [--import FILE.m3u] [--admin-key KEY]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR         Address to bind to (default: 0.0.0.0:5000)");
    eprintln!("  --import FILE     Seed the channel registry from an M3U playlist");
    eprintln!("  --admin-key KEY   Require X-Auth-Key on /admin endpoints");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut bind_addr: SocketAddr = "0.0.0.0:5000".parse().unwrap();
    let mut import_path: Option<String> = None;
    let mut admin_key: Option<String> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--import" => {
                import_path = iter.next().cloned();
                if import_path.is_none() {
                    eprintln!("Error: --import needs a file path");
                    std::process::exit(1);
                }
            }
            "--admin-key" => {
                admin_key = iter.next().cloned();
                if admin_key.is_none() {
                    eprintln!("Error: --admin-key needs a value");
                    std::process::exit(1);
                }
            }
            other => match parse_bind_addr(other) {
                Ok(addr) => bind_addr = addr,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    eprintln!();
                    print_usage();
                    std::process::exit(1);
                }
            },
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("iptv_relay=debug".parse()?)
                .add_directive("proxy_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::with_addr(bind_addr);
    if let Some(key) = admin_key {
        config = config.admin_key(key);
    }

    let state = AppState::new(config);

    if let Some(path) = import_path {
        let content = std::fs::read_to_string(&path)?;
        let imported = import_m3u(&state.channels, &content);
        println!("Imported {} channels from {}", imported, path);
    }

    println!("Starting IPTV relay on {}", bind_addr);
    println!();
    println!("Playlist:  http://{}/playlist.m3u", bind_addr);
    println!("Status:    http://{}/", bind_addr);
    println!();

    iptv_relay::server::serve_until(state, async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    })
    .await?;

    Ok(())
}
