//! Broker configuration

/// Relay policy options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Treat `watch` from an unidentified connection as an implicit operator
    /// hello instead of dropping it
    pub auto_identify_watchers: bool,

    /// Send `site-offline` to every operator dropped from a site's watcher set
    /// when the site goes away or is superseded
    pub notify_watchers_on_site_loss: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            auto_identify_watchers: true,
            notify_watchers_on_site_loss: true,
        }
    }
}

impl BrokerConfig {
    /// Require an explicit hello before `watch`
    pub fn require_hello(mut self) -> Self {
        self.auto_identify_watchers = false;
        self
    }

    /// Set whether dropped watchers are told the site went offline
    pub fn notify_watchers_on_site_loss(mut self, notify: bool) -> Self {
        self.notify_watchers_on_site_loss = notify;
        self
    }
}
