//! Signaling broker for live video sessions
//!
//! Sites publish a single live stream under a stable site id; operators watch
//! any number of sites. The broker never touches media. It keeps track of who
//! is connected, which connection publishes each site, which operators watch
//! each site and which one of them is primary, and relays the negotiation
//! messages of the external media transport between exactly two endpoints.
//!
//! # Architecture
//!
//! ```text
//!   ws frame ──► Connection ──► SignalBroker::dispatch ──► ServerMessage ──► peer outbox
//!                    │                  │
//!                    │        ┌─────────┴──────────┐
//!                    │        │ ClientRegistry     │
//!                    │        │ SiteDirectory      │
//!                    │        │ WatcherIndex       │
//!                    │        └─────────┬──────────┘
//!                    └── close ──► SignalBroker::disconnect
//! ```
//!
//! # Example
//!
//! ```no_run
//! use signal_broker::{ServerConfig, SignalServer};
//!
//! # async fn example() -> signal_broker::Result<()> {
//! let server = SignalServer::new(ServerConfig::default());
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod broker;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use broker::{BrokerConfig, Disposition, RelayError, SignalBroker};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ClientId, Identity, SiteId};
pub use server::{ServerConfig, SignalServer};
pub use stats::BrokerStats;
