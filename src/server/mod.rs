//! WebSocket server
//!
//! Accepts TCP connections, upgrades them to WebSocket and hands every frame
//! to the shared [`SignalBroker`](crate::broker::SignalBroker).

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::SignalServer;
