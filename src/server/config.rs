//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Time allowed to flush queued messages after a connection ends
    pub close_timeout: Duration,

    /// Messages buffered per connection before new ones are dropped
    pub outbound_queue_capacity: usize,

    /// Interval of the periodic stats log (zero disables it)
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Signaling is latency bound
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            outbound_queue_capacity: 256,
            stats_interval: Duration::from_secs(60),
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

    /// Set only the port of the bind address
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the time allowed to flush queued messages on close
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set per-connection outbound queue capacity (at least 1)
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set stats log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
