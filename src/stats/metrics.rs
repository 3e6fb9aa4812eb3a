//! Broker-wide statistics snapshot

/// Point-in-time view of the broker's stores and counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Live connections, identified or not
    pub clients: usize,
    /// Connections identified as sites (including superseded ones)
    pub sites: usize,
    /// Connections identified as operators
    pub operators: usize,
    /// Site ids with a current publisher
    pub published_sites: usize,
    /// Watcher entries summed over all sites
    pub watcher_entries: usize,
    /// Sites with a primary operator
    pub primaries: usize,
    /// Messages queued to a recipient
    pub messages_relayed: u64,
    /// Messages dropped at send time (recipient gone or outbox full)
    pub messages_dropped: u64,
    /// Inbound messages dropped as malformed or protocol violations
    pub messages_rejected: u64,
}

impl BrokerStats {
    /// Connections that have not sent hello yet
    pub fn unidentified(&self) -> usize {
        self.clients.saturating_sub(self.sites + self.operators)
    }

    /// Sites published by a connection other than their first owner
    pub fn superseded_sites(&self) -> usize {
        self.sites.saturating_sub(self.published_sites)
    }
}
