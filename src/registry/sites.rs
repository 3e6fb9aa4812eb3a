//! Site directory
//!
//! Maps each published site id to the one connection currently publishing it.

use std::collections::HashMap;

use super::ids::{ClientId, SiteId};

/// Directory of active sites
///
/// Not synchronized on its own; the broker keeps it behind the same lock as
/// the [`WatcherIndex`](super::WatcherIndex) so publish and watcher reset
/// happen together.
#[derive(Debug, Default)]
pub struct SiteDirectory {
    owners: HashMap<SiteId, ClientId>,
}

impl SiteDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a site, last writer wins
    ///
    /// Returns the previous owner, if any, so the caller can decide what to
    /// do about it. Re-publishing by the same owner returns that owner.
    pub fn publish(&mut self, site: SiteId, owner: ClientId) -> Option<ClientId> {
        self.owners.insert(site, owner)
    }

    /// Resolve a site to its publishing connection
    pub fn resolve(&self, site: &SiteId) -> Option<ClientId> {
        self.owners.get(site).copied()
    }

    /// Remove a site only if `owner` still publishes it
    ///
    /// A stale disconnect must not clobber a newer publisher of the same id.
    /// Returns whether the entry was removed.
    pub fn unpublish(&mut self, site: &SiteId, owner: ClientId) -> bool {
        if self.owners.get(site) != Some(&owner) {
            return false;
        }
        self.owners.remove(site);
        true
    }

    /// Whether `owner` currently publishes `site`
    pub fn is_owner(&self, site: &SiteId, owner: ClientId) -> bool {
        self.owners.get(site) == Some(&owner)
    }

    /// Number of published sites
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no site is published
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
