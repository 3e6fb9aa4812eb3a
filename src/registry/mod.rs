//! Connection, site and watcher stores
//!
//! The broker keeps three stores. The [`ClientRegistry`] owns every live
//! connection; the [`SiteDirectory`] and [`WatcherIndex`] only hold ids.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<SignalBroker>
//!         ┌──────────────────────┬───────────────────────────┐
//!         │ ClientRegistry       │ RwLock<SiteTable>         │
//!         │   RwLock<HashMap<    │   SiteDirectory           │
//!         │     ClientId,        │     SiteId -> ClientId    │
//!         │     ClientEntry {    │   WatcherIndex            │
//!         │       identity,      │     SiteId -> WatchSet {  │
//!         │       outbox,        │       watchers,           │
//!         │     }>>              │       primary,            │
//!         │                      │     }                     │
//!         └──────────┬───────────┴─────────────┬─────────────┘
//!                    │                         │
//!            deliver(id, msg)           resolve / watchers_of
//!                    │                         │
//!                    ▼                         ▼
//!             outbox ──► writer task ──► WebSocket
//! ```
//!
//! The site directory and watcher index share one lock so that a publish
//! together with its watcher reset, and a watcher removal together with its
//! primary clear, are observed atomically.

pub mod clients;
pub mod entry;
pub mod ids;
pub mod sites;
pub mod watchers;

pub use clients::ClientRegistry;
pub use entry::{ClientEntry, ClientInfo, Delivery, Identity, Role};
pub use ids::{ClientId, SiteId};
pub use sites::SiteDirectory;
pub use watchers::{Departure, WatchSet, WatcherIndex};

/// Site directory and watcher index, guarded together
#[derive(Debug, Default)]
pub struct SiteTable {
    /// Published sites
    pub directory: SiteDirectory,
    /// Watchers and primaries per site
    pub watchers: WatcherIndex,
}

impl SiteTable {
    /// Create empty stores
    pub fn new() -> Self {
        Self::default()
    }
}
