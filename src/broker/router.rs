//! Message routing
//!
//! One handler per inbound message type. A handler validates the sender's
//! identity, performs at most one state change and pushes the derived
//! messages onto the outbound buffer.

use std::sync::atomic::Ordering;

use crate::protocol::{
    parse_client_message, AnswerRequest, ClientMessage, Hello, IceRequest, OfferRequest,
    ServerMessage,
};
use crate::registry::{ClientId, Identity, Role, SiteId};

use super::{Disposition, Outbound, RelayError, SignalBroker};

impl SignalBroker {
    /// Handle one text frame from a connection
    ///
    /// Malformed frames and protocol violations are logged and dropped; the
    /// connection always stays open unless the message was `bye`.
    pub async fn dispatch(&self, id: ClientId, text: &str) -> Disposition {
        let message = match parse_client_message(text) {
            Ok(message) => message,
            Err(e) => {
                self.reject(id, None, RelayError::from(e), &mut Outbound::new())
                    .await;
                return Disposition::Continue;
            }
        };

        self.dispatch_message(id, message).await
    }

    /// Handle one binary frame, accepted if it is UTF-8 JSON
    pub async fn dispatch_bytes(&self, id: ClientId, data: &[u8]) -> Disposition {
        match std::str::from_utf8(data) {
            Ok(text) => self.dispatch(id, text).await,
            Err(_) => {
                self.reject(id, None, RelayError::NotUtf8, &mut Outbound::new())
                    .await;
                Disposition::Continue
            }
        }
    }

    /// Handle one decoded message
    pub async fn dispatch_message(&self, id: ClientId, message: ClientMessage) -> Disposition {
        let kind = message.kind();
        let mut outbound = Outbound::new();

        let result = match message {
            ClientMessage::Hello(hello) => self.on_hello(id, hello, &mut outbound).await,
            ClientMessage::Watch { site_id } => self.on_watch(id, site_id, &mut outbound).await,
            ClientMessage::Unwatch { site_id } => self.on_unwatch(id, site_id).await,
            ClientMessage::Offer(offer) => self.on_offer(id, offer, &mut outbound).await,
            ClientMessage::Answer(answer) => self.on_answer(id, answer, &mut outbound).await,
            ClientMessage::Ice(ice) => self.on_ice(id, ice, &mut outbound).await,
            ClientMessage::Promote { site_id } => {
                self.on_promote(id, site_id, &mut outbound).await
            }
            ClientMessage::Attention => self.on_attention(id, &mut outbound).await,
            ClientMessage::Bye => {
                tracing::debug!(client_id = %id, "Client said bye");
                return Disposition::Close;
            }
        };

        match result {
            Ok(()) => self.flush(outbound).await,
            Err(e) => self.reject(id, Some(kind), e, &mut outbound).await,
        }

        Disposition::Continue
    }

    async fn reject(
        &self,
        id: ClientId,
        kind: Option<&'static str>,
        error: RelayError,
        outbound: &mut Outbound,
    ) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);

        if error.is_malformed() {
            tracing::debug!(client_id = %id, error = %error, "Dropped malformed message");
        } else {
            tracing::debug!(client_id = %id, kind = kind.unwrap_or("?"), error = %error, "Dropped message");
        }

        if let Some(code) = error.reply_code() {
            outbound.push((
                id,
                ServerMessage::Error {
                    error: code.to_string(),
                },
            ));
        }
        self.flush(std::mem::take(outbound)).await;
    }

    async fn identity_of(&self, id: ClientId) -> Result<Identity, RelayError> {
        self.clients
            .identity(id)
            .await
            .ok_or(RelayError::UnknownClient(id))
    }

    async fn require_operator(&self, id: ClientId, kind: &'static str) -> Result<(), RelayError> {
        match self.identity_of(id).await? {
            Identity::Operator => Ok(()),
            Identity::Unidentified => Err(RelayError::NotIdentified),
            Identity::Site(_) => Err(RelayError::WrongRole {
                kind,
                expected: Role::Operator,
            }),
        }
    }

    async fn require_site(&self, id: ClientId, kind: &'static str) -> Result<SiteId, RelayError> {
        match self.identity_of(id).await? {
            Identity::Site(site) => Ok(site),
            Identity::Unidentified => Err(RelayError::NotIdentified),
            Identity::Operator => Err(RelayError::WrongRole {
                kind,
                expected: Role::Site,
            }),
        }
    }

    async fn on_hello(
        &self,
        id: ClientId,
        hello: Hello,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        let identity = match hello.role.as_str() {
            "site" => match hello.site_id {
                Some(site) if !site.is_empty() => Identity::Site(site),
                _ => return Err(RelayError::MissingSiteId),
            },
            "operator" => Identity::Operator,
            _ => return Err(RelayError::UnknownRole(hello.role)),
        };

        let current = self.identity_of(id).await?;
        if current != identity {
            self.unwind(id, &current, outbound).await;
        }

        let name = hello.name;
        let shown_name = name.clone().unwrap_or_else(|| "unnamed".to_string());
        if self
            .clients
            .identify(id, identity.clone(), name)
            .await
            .is_none()
        {
            return Err(RelayError::UnknownClient(id));
        }

        let Identity::Site(site) = identity else {
            tracing::info!(client_id = %id, role = "operator", name = %shown_name, "Client identified");
            return Ok(());
        };

        let dropped = {
            let mut sites = self.sites.write().await;
            match sites.directory.publish(site.clone(), id) {
                Some(previous) if previous != id => {
                    tracing::warn!(
                        site = %site,
                        previous = %previous,
                        client_id = %id,
                        "Site id taken over by a new connection"
                    );
                    sites.watchers.clear_site(&site)
                }
                _ => Vec::new(),
            }
        };

        tracing::info!(client_id = %id, site = %site, name = %shown_name, "Site online");
        self.notify_site_loss(&site, dropped, outbound);
        Ok(())
    }

    async fn on_watch(
        &self,
        id: ClientId,
        site: SiteId,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        match self.identity_of(id).await? {
            Identity::Operator => {}
            Identity::Unidentified if self.config.auto_identify_watchers => {
                self.clients.identify(id, Identity::Operator, None).await;
                tracing::info!(client_id = %id, "Watch before hello, assuming operator");
            }
            Identity::Unidentified => return Err(RelayError::NotIdentified),
            Identity::Site(_) => {
                return Err(RelayError::WrongRole {
                    kind: "watch",
                    expected: Role::Operator,
                })
            }
        }

        let mut sites = self.sites.write().await;
        let Some(owner) = sites.directory.resolve(&site) else {
            drop(sites);
            tracing::info!(client_id = %id, site = %site, "Watch for offline site");
            outbound.push((id, ServerMessage::SiteOffline { site_id: site }));
            return Ok(());
        };

        if !sites.watchers.add_watcher(site.clone(), id) {
            tracing::debug!(client_id = %id, site = %site, "Already watching");
            return Ok(());
        }
        drop(sites);

        tracing::info!(client_id = %id, site = %site, owner = %owner, "Operator watching");
        outbound.push((
            owner,
            ServerMessage::IncomingViewer {
                operator_id: id,
                site_id: site,
            },
        ));
        Ok(())
    }

    async fn on_unwatch(&self, id: ClientId, site: SiteId) -> Result<(), RelayError> {
        self.require_operator(id, "unwatch").await?;

        if !self.sites.write().await.watchers.remove_watcher(&site, id) {
            return Err(RelayError::NotWatching(site));
        }

        tracing::info!(client_id = %id, site = %site, "Operator stopped watching");
        Ok(())
    }

    async fn on_offer(
        &self,
        id: ClientId,
        offer: OfferRequest,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        self.require_site(id, "offer").await?;

        tracing::debug!(client_id = %id, site = %offer.site_id, to = %offer.to, "Relaying offer");
        outbound.push((
            offer.to,
            ServerMessage::Offer {
                from: id,
                site_id: offer.site_id,
                sdp: offer.sdp,
            },
        ));
        Ok(())
    }

    async fn on_answer(
        &self,
        id: ClientId,
        answer: AnswerRequest,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        self.require_operator(id, "answer").await?;

        let owner = self
            .resolve_site(&answer.site_id)
            .await
            .ok_or_else(|| RelayError::SiteOffline(answer.site_id.clone()))?;

        tracing::debug!(client_id = %id, site = %answer.site_id, owner = %owner, "Relaying answer");
        outbound.push((
            owner,
            ServerMessage::Answer {
                from: id,
                site_id: answer.site_id,
                sdp: answer.sdp,
            },
        ));
        Ok(())
    }

    async fn on_ice(
        &self,
        id: ClientId,
        ice: IceRequest,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        match self.identity_of(id).await? {
            Identity::Operator => {
                let site = ice.site_id.ok_or(RelayError::MissingTarget)?;
                let owner = self
                    .resolve_site(&site)
                    .await
                    .ok_or_else(|| RelayError::SiteOffline(site.clone()))?;

                tracing::debug!(client_id = %id, site = %site, owner = %owner, "Relaying ice to site");
                outbound.push((
                    owner,
                    ServerMessage::Ice {
                        from: id,
                        site_id: None,
                        candidate: ice.candidate,
                    },
                ));
            }
            Identity::Site(site) => {
                let to = ice.to.ok_or(RelayError::MissingTarget)?;

                tracing::debug!(client_id = %id, site = %site, to = %to, "Relaying ice to operator");
                outbound.push((
                    to,
                    ServerMessage::Ice {
                        from: id,
                        site_id: Some(site),
                        candidate: ice.candidate,
                    },
                ));
            }
            Identity::Unidentified => return Err(RelayError::NotIdentified),
        }
        Ok(())
    }

    async fn on_promote(
        &self,
        id: ClientId,
        site: SiteId,
        outbound: &mut Outbound,
    ) -> Result<(), RelayError> {
        self.require_operator(id, "promote").await?;

        let owner = {
            let mut sites = self.sites.write().await;
            let owner = sites
                .directory
                .resolve(&site)
                .ok_or_else(|| RelayError::SiteOffline(site.clone()))?;
            if !sites.watchers.is_watching(&site, id) {
                return Err(RelayError::NotWatching(site));
            }
            sites.watchers.set_primary(&site, id);
            owner
        };

        tracing::info!(client_id = %id, site = %site, owner = %owner, "Operator promoted to primary");
        outbound.push((
            owner,
            ServerMessage::Promote {
                operator_id: id,
                site_id: site,
            },
        ));
        Ok(())
    }

    async fn on_attention(&self, id: ClientId, outbound: &mut Outbound) -> Result<(), RelayError> {
        let site = self.require_site(id, "attention").await?;

        let watchers = {
            let sites = self.sites.read().await;
            if !sites.directory.is_owner(&site, id) {
                return Err(RelayError::NotSiteOwner(site));
            }
            sites.watchers.watchers_of(&site)
        };

        let at = chrono::Utc::now().timestamp_millis();
        tracing::info!(site = %site, operators = watchers.len(), "Attention requested");

        for operator in watchers {
            outbound.push((
                operator,
                ServerMessage::Attention {
                    site_id: site.clone(),
                    at,
                },
            ));
        }
        Ok(())
    }
}
