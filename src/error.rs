//! Server error types
//!
//! These cover the transport side only. Per-message protocol failures are
//! [`RelayError`](crate::broker::RelayError) and never leave the router.

use std::time::Duration;

/// Error type for server and connection operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket level failure (bind, accept, configure)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer did not finish the WebSocket upgrade in time
    #[error("WebSocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

/// Result alias for server operations
pub type Result<T> = std::result::Result<T, Error>;
