//! Signaling broker
//!
//! [`SignalBroker`] ties the three stores together. The router
//! ([`SignalBroker::dispatch`]) applies one inbound message: it checks the
//! sender's identity, performs at most one state change, and queues the
//! derived messages. The lifecycle path ([`SignalBroker::disconnect`]) unwinds
//! a closed connection from every store.
//!
//! Handlers never await a remote peer. Outbound messages are collected while
//! the store locks are held and queued only after they are released, so a slow
//! connection cannot stall another connection's handler.

pub mod config;
pub mod error;
mod lifecycle;
mod router;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerMessage;
use crate::registry::{ClientId, ClientRegistry, Role, SiteId, SiteTable};
use crate::stats::BrokerStats;

pub use config::BrokerConfig;
pub use error::RelayError;

/// Messages queued by a handler, delivered once the stores are unlocked
pub(crate) type Outbound = Vec<(ClientId, ServerMessage)>;

/// What the connection should do after a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading
    Continue,
    /// Close the connection (`bye`)
    Close,
}

#[derive(Debug, Default)]
struct Counters {
    relayed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Central signaling state shared by all connections
pub struct SignalBroker {
    clients: ClientRegistry,
    sites: RwLock<SiteTable>,
    config: BrokerConfig,
    counters: Counters,
}

impl SignalBroker {
    /// Create a broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            clients: ClientRegistry::new(),
            sites: RwLock::new(SiteTable::new()),
            config,
            counters: Counters::default(),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Get the connection registry
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Register a new connection and queue its `welcome`
    pub async fn connect(&self, outbox: mpsc::Sender<ServerMessage>) -> ClientId {
        self.clients.register(outbox).await
    }

    /// Connection currently publishing a site
    pub async fn resolve_site(&self, site: &SiteId) -> Option<ClientId> {
        self.sites.read().await.directory.resolve(site)
    }

    /// Operators watching a site
    pub async fn watchers_of(&self, site: &SiteId) -> HashSet<ClientId> {
        self.sites.read().await.watchers.watchers_of(site)
    }

    /// Primary operator of a site
    pub async fn primary_of(&self, site: &SiteId) -> Option<ClientId> {
        self.sites.read().await.watchers.get_primary(site)
    }

    /// Snapshot of broker-wide statistics
    pub async fn stats(&self) -> BrokerStats {
        let (published_sites, watcher_entries, primaries) = {
            let sites = self.sites.read().await;
            (
                sites.directory.len(),
                sites.watchers.watcher_count(),
                sites.watchers.primary_count(),
            )
        };

        BrokerStats {
            clients: self.clients.len().await,
            sites: self.clients.count_role(Role::Site).await,
            operators: self.clients.count_role(Role::Operator).await,
            published_sites,
            watcher_entries,
            primaries,
            messages_relayed: self.counters.relayed.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
            messages_rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Queue collected messages and account for the ones that were dropped
    async fn flush(&self, outbound: Outbound) {
        if outbound.is_empty() {
            return;
        }

        let total = outbound.len();
        let queued = self.clients.deliver_all(outbound).await;

        self.counters
            .relayed
            .fetch_add(queued as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add((total - queued) as u64, Ordering::Relaxed);
    }

    /// Tell dropped watchers that their site is gone
    fn notify_site_loss(&self, site: &SiteId, watchers: Vec<ClientId>, outbound: &mut Outbound) {
        if !self.config.notify_watchers_on_site_loss {
            return;
        }
        for operator in watchers {
            outbound.push((
                operator,
                ServerMessage::SiteOffline {
                    site_id: site.clone(),
                },
            ));
        }
    }
}

impl Default for SignalBroker {
    fn default() -> Self {
        Self::new()
    }
}
