//! Connection teardown
//!
//! Unwinds a connection's identity from the site directory and watcher index.
//! Used on transport close and when a connection re-identifies.

use crate::registry::{ClientId, Identity};

use super::{Outbound, SignalBroker};

impl SignalBroker {
    /// Handle the close of a connection
    ///
    /// Derived state goes first; the registry entry is removed last so that
    /// handlers still in flight for other connections can resolve it. Calling
    /// this for an unknown or already removed connection is a no-op.
    pub async fn disconnect(&self, id: ClientId) {
        let Some(identity) = self.clients.identity(id).await else {
            return;
        };

        let mut outbound = Outbound::new();
        self.unwind(id, &identity, &mut outbound).await;
        self.flush(outbound).await;

        let removed = self.clients.remove(id).await;
        let name = removed.as_ref().and_then(|info| info.display_name.as_deref());

        match &identity {
            Identity::Site(site) => {
                tracing::info!(client_id = %id, site = %site, "Site connection closed");
            }
            Identity::Operator => {
                tracing::info!(client_id = %id, name = name.unwrap_or("unnamed"), "Operator disconnected");
            }
            Identity::Unidentified => {
                tracing::debug!(client_id = %id, "Client disconnected");
            }
        }
    }

    /// Remove everything `identity` contributed to the shared stores
    ///
    /// A site that has been superseded owns nothing, so its unwind leaves the
    /// newer publisher's entry and watchers alone.
    pub(super) async fn unwind(&self, id: ClientId, identity: &Identity, outbound: &mut Outbound) {
        match identity {
            Identity::Site(site) => {
                let dropped = {
                    let mut sites = self.sites.write().await;
                    if !sites.directory.unpublish(site, id) {
                        tracing::debug!(
                            client_id = %id,
                            site = %site,
                            "Superseded site owner left, nothing to unpublish"
                        );
                        return;
                    }
                    sites.watchers.clear_site(site)
                };

                tracing::info!(
                    client_id = %id,
                    site = %site,
                    dropped_watchers = dropped.len(),
                    "Site offline"
                );
                self.notify_site_loss(site, dropped, outbound);
            }
            Identity::Operator => {
                let departure = self.sites.write().await.watchers.remove_operator(id);

                if !departure.sites.is_empty() {
                    tracing::debug!(
                        client_id = %id,
                        watched = departure.sites.len(),
                        primary_of = departure.primary_of.len(),
                        "Operator left watcher sets"
                    );
                }
            }
            Identity::Unidentified => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::broker::test_support::TestClient;
    use crate::broker::{BrokerConfig, SignalBroker};
    use crate::registry::SiteId;

    #[tokio::test]
    async fn test_site_disconnect_clears_watchers_and_primary() {
        let broker = SignalBroker::new();
        let site = TestClient::site(&broker, "x").await;
        let mut op = TestClient::operator(&broker).await;
        op.send(&broker, r#"{"type":"watch","siteId":"x"}"#).await;
        op.send(&broker, r#"{"type":"promote","siteId":"x"}"#).await;
        assert_eq!(broker.primary_of(&SiteId::from("x")).await, Some(op.id));

        broker.disconnect(site.id).await;

        assert!(broker.resolve_site(&SiteId::from("x")).await.is_none());
        assert!(broker.watchers_of(&SiteId::from("x")).await.is_empty());
        assert!(broker.primary_of(&SiteId::from("x")).await.is_none());
        assert!(broker.clients().lookup(site.id).await.is_none());

        let received = op.drain();
        assert_eq!(
            received.last().unwrap(),
            &json!({"type": "site-offline", "siteId": "x"})
        );
    }

    #[tokio::test]
    async fn test_site_loss_notification_can_be_disabled() {
        let broker =
            SignalBroker::with_config(BrokerConfig::default().notify_watchers_on_site_loss(false));
        let site = TestClient::site(&broker, "x").await;
        let mut op = TestClient::operator(&broker).await;
        op.send(&broker, r#"{"type":"watch","siteId":"x"}"#).await;
        op.drain();

        broker.disconnect(site.id).await;

        assert!(op.drain().is_empty());
        assert!(broker.watchers_of(&SiteId::from("x")).await.is_empty());
    }

    #[tokio::test]
    async fn test_operator_disconnect_clears_primary_everywhere() {
        let broker = SignalBroker::new();
        let _x = TestClient::site(&broker, "x").await;
        let _y = TestClient::site(&broker, "y").await;
        let op = TestClient::operator(&broker).await;
        let other = TestClient::operator(&broker).await;

        for site in ["x", "y"] {
            op.send(&broker, &format!(r#"{{"type":"watch","siteId":"{}"}}"#, site))
                .await;
            op.send(&broker, &format!(r#"{{"type":"promote","siteId":"{}"}}"#, site))
                .await;
        }
        other.send(&broker, r#"{"type":"watch","siteId":"y"}"#).await;

        broker.disconnect(op.id).await;

        assert!(broker.primary_of(&SiteId::from("x")).await.is_none());
        assert!(broker.primary_of(&SiteId::from("y")).await.is_none());
        assert!(broker.watchers_of(&SiteId::from("x")).await.is_empty());
        let y_watchers = broker.watchers_of(&SiteId::from("y")).await;
        assert_eq!(y_watchers.len(), 1);
        assert!(y_watchers.contains(&other.id));
        // Sites stay published
        assert!(broker.resolve_site(&SiteId::from("x")).await.is_some());
    }

    #[tokio::test]
    async fn test_superseded_owner_disconnect_keeps_new_owner() {
        let broker = SignalBroker::new();
        let old = TestClient::site(&broker, "x").await;
        let new = TestClient::site(&broker, "x").await;
        let op = TestClient::operator(&broker).await;
        op.send(&broker, r#"{"type":"watch","siteId":"x"}"#).await;

        broker.disconnect(old.id).await;

        assert_eq!(broker.resolve_site(&SiteId::from("x")).await, Some(new.id));
        assert!(broker.watchers_of(&SiteId::from("x")).await.contains(&op.id));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let broker = SignalBroker::new();
        let client = TestClient::connect(&broker).await;

        broker.disconnect(client.id).await;
        broker.disconnect(client.id).await;

        assert!(broker.clients().is_empty().await);
    }
}
