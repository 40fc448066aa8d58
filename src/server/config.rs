//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::relay::RelayConfig;
use crate::upstream::FetchConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// External base URL used in rendered playlists; when unset, the
    /// request's Host header is used
    pub public_base_url: Option<String>,

    /// Shared secret for admin endpoints, checked against `X-Auth-Key`;
    /// `None` leaves the admin surface open
    pub admin_key: Option<String>,

    /// Upstream fetcher settings
    pub fetch: FetchConfig,

    /// Relay session settings
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().unwrap(),
            public_base_url: None,
            admin_key: None,
            fetch: FetchConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the external base URL used in playlists
    pub fn public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    /// Require this key on admin endpoints
    pub fn admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into());
        self
    }

    /// Set the upstream connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.fetch.connect_timeout = timeout;
        self
    }

    /// Set the per-chunk upstream read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.relay.read_timeout = timeout;
        self
    }

    /// Set the failover retry budget (full passes over the source list)
    pub fn failover_passes(mut self, passes: u32) -> Self {
        self.relay.failover.max_passes = passes.max(1);
        self
    }

    /// Set the broadcast capacity in chunks
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.relay.broadcast_capacity = capacity.max(1);
        self
    }
}
