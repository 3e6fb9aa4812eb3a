//! Connection registry
//!
//! Owns every live connection record. All other stores refer to connections
//! by [`ClientId`] only.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerMessage;

use super::entry::{ClientEntry, ClientInfo, Delivery, Identity, Role};
use super::ids::ClientId;

/// Registry of all live connections
///
/// Thread-safe via `RwLock`. Relays only need read access, so concurrent
/// traffic from unrelated connections does not serialize here.
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly accepted connection
    ///
    /// Assigns a new id and queues the `welcome` message carrying it.
    pub async fn register(&self, outbox: mpsc::Sender<ServerMessage>) -> ClientId {
        let id = ClientId::generate();
        let entry = ClientEntry::new(id, outbox);
        let delivery = entry.deliver(ServerMessage::Welcome { client_id: id });
        if delivery != Delivery::Queued {
            tracing::debug!(client_id = %id, ?delivery, "Dropped welcome");
        }

        self.clients.write().await.insert(id, entry);
        tracing::debug!(client_id = %id, "Client registered");

        id
    }

    /// Update the identity and display name of a connection
    ///
    /// Returns the previous identity, or `None` if the connection is unknown or
    /// the new identity is [`Identity::Unidentified`] (no state change).
    pub async fn identify(
        &self,
        id: ClientId,
        identity: Identity,
        display_name: Option<String>,
    ) -> Option<Identity> {
        if identity == Identity::Unidentified {
            tracing::warn!(client_id = %id, "Ignoring identify without a role");
            return None;
        }

        let mut clients = self.clients.write().await;
        let entry = clients.get_mut(&id)?;

        let previous = std::mem::replace(&mut entry.identity, identity);
        if display_name.is_some() {
            entry.display_name = display_name;
        }

        Some(previous)
    }

    /// Look up a connection
    pub async fn lookup(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.read().await.get(&id).map(ClientEntry::info)
    }

    /// Current identity of a connection
    pub async fn identity(&self, id: ClientId) -> Option<Identity> {
        self.clients
            .read()
            .await
            .get(&id)
            .map(|entry| entry.identity.clone())
    }

    /// Queue a message for one connection
    ///
    /// An unknown id counts as [`Delivery::Closed`].
    pub async fn deliver(&self, id: ClientId, message: ServerMessage) -> Delivery {
        match self.clients.read().await.get(&id) {
            Some(entry) => entry.deliver(message),
            None => Delivery::Closed,
        }
    }

    /// Queue a batch of messages under a single read lock
    ///
    /// Returns how many were queued.
    pub async fn deliver_all(&self, messages: Vec<(ClientId, ServerMessage)>) -> usize {
        let clients = self.clients.read().await;
        let mut queued = 0;

        for (id, message) in messages {
            let delivery = clients
                .get(&id)
                .map_or(Delivery::Closed, |entry| entry.deliver(message));

            if delivery == Delivery::Queued {
                queued += 1;
            } else {
                tracing::debug!(client_id = %id, ?delivery, "Dropped outbound message");
            }
        }

        queued
    }

    /// Visit every live connection
    pub async fn for_each(&self, mut f: impl FnMut(&ClientEntry)) {
        for entry in self.clients.read().await.values() {
            f(entry);
        }
    }

    /// Remove a connection
    ///
    /// Only the lifecycle path calls this, after all derived state is gone.
    pub(crate) async fn remove(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.info())
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no connections are registered
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Number of connections identified with the given role
    pub async fn count_role(&self, role: Role) -> usize {
        let mut count = 0;
        self.for_each(|entry| {
            if entry.identity.role() == Some(role) {
                count += 1;
            }
        })
        .await;
        count
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
