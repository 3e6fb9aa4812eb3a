//! Watcher index and primary election
//!
//! Tracks which operators watch each site and which one of them, if any, is
//! the site's primary. The primary is always a member of the watcher set:
//! every path that removes a watcher also clears a primary naming it.

use std::collections::{HashMap, HashSet};

use super::ids::{ClientId, SiteId};

/// Watchers of one site
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSet {
    /// Operators currently watching
    pub watchers: HashSet<ClientId>,
    /// Operator designated primary, always one of `watchers`
    pub primary: Option<ClientId>,
}

/// What removing an operator from the whole index touched
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Sites the operator was watching
    pub sites: Vec<SiteId>,
    /// Sites on which it was primary
    pub primary_of: Vec<SiteId>,
}

/// Per-site watcher sets with primary designation
#[derive(Debug, Default)]
pub struct WatcherIndex {
    sites: HashMap<SiteId, WatchSet>,
}

impl WatcherIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operator to a site's watcher set
    ///
    /// Returns `true` if the operator was not already watching.
    pub fn add_watcher(&mut self, site: SiteId, operator: ClientId) -> bool {
        self.sites.entry(site).or_default().watchers.insert(operator)
    }

    /// Remove an operator from a site's watcher set
    ///
    /// Clears the primary designation if it named `operator`. Returns `true`
    /// if the operator was watching.
    pub fn remove_watcher(&mut self, site: &SiteId, operator: ClientId) -> bool {
        let Some(set) = self.sites.get_mut(site) else {
            return false;
        };

        let removed = set.watchers.remove(&operator);
        if set.primary == Some(operator) {
            set.primary = None;
        }
        if set.watchers.is_empty() {
            self.sites.remove(site);
        }

        removed
    }

    /// Designate a watching operator as primary
    ///
    /// No-op returning `false` if `operator` is not watching `site`.
    pub fn set_primary(&mut self, site: &SiteId, operator: ClientId) -> bool {
        match self.sites.get_mut(site) {
            Some(set) if set.watchers.contains(&operator) => {
                set.primary = Some(operator);
                true
            }
            _ => false,
        }
    }

    /// Current primary of a site
    pub fn get_primary(&self, site: &SiteId) -> Option<ClientId> {
        self.sites.get(site).and_then(|set| set.primary)
    }

    /// Operators watching a site
    pub fn watchers_of(&self, site: &SiteId) -> HashSet<ClientId> {
        self.sites
            .get(site)
            .map(|set| set.watchers.clone())
            .unwrap_or_default()
    }

    /// Whether `operator` watches `site`
    pub fn is_watching(&self, site: &SiteId, operator: ClientId) -> bool {
        self.sites
            .get(site)
            .is_some_and(|set| set.watchers.contains(&operator))
    }

    /// Drop a site's whole watcher set and primary
    ///
    /// Returns the operators that were watching.
    pub fn clear_site(&mut self, site: &SiteId) -> Vec<ClientId> {
        self.sites
            .remove(site)
            .map(|set| set.watchers.into_iter().collect())
            .unwrap_or_default()
    }

    /// Remove an operator from every watcher set
    ///
    /// Linear in the number of watched sites.
    pub fn remove_operator(&mut self, operator: ClientId) -> Departure {
        let mut departure = Departure::default();

        for (site, set) in self.sites.iter_mut() {
            if set.watchers.remove(&operator) {
                departure.sites.push(site.clone());
            }
            if set.primary == Some(operator) {
                set.primary = None;
                departure.primary_of.push(site.clone());
            }
        }
        self.sites.retain(|_, set| !set.watchers.is_empty());

        departure
    }

    /// Number of sites with at least one watcher
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Total watcher entries across all sites
    pub fn watcher_count(&self) -> usize {
        self.sites.values().map(|set| set.watchers.len()).sum()
    }

    /// Number of sites with a primary
    pub fn primary_count(&self) -> usize {
        self.sites.values().filter(|set| set.primary.is_some()).count()
    }
}
