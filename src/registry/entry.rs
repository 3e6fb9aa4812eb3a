//! Connection entry and identity types
//!
//! This module defines the per-connection record owned by the
//! [`ClientRegistry`](super::ClientRegistry).

use std::time::Instant;

use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

use super::ids::{ClientId, SiteId};

/// Role a connection has identified with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Fixed publishing endpoint
    Site,
    /// Roaming viewer
    Operator,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Site => "site",
            Role::Operator => "operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identification state of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Accepted, no hello received yet
    Unidentified,
    /// Publishes the given site
    Site(SiteId),
    /// Watches zero or more sites
    Operator,
}

impl Identity {
    /// Role of this identity, if identified
    pub fn role(&self) -> Option<Role> {
        match self {
            Identity::Unidentified => None,
            Identity::Site(_) => Some(Role::Site),
            Identity::Operator => Some(Role::Operator),
        }
    }
}

/// Outcome of handing a message to a connection's outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task
    Queued,
    /// Outbox full, message dropped
    Full,
    /// Connection already closed, message dropped
    Closed,
}

/// Entry for a single live connection
#[derive(Debug)]
pub struct ClientEntry {
    /// Broker-assigned id
    pub id: ClientId,

    /// Current identity
    pub identity: Identity,

    /// Informational name from hello
    pub display_name: Option<String>,

    /// When the connection was accepted
    pub connected_at: Instant,

    /// Queue drained by the connection's writer task
    outbox: mpsc::Sender<ServerMessage>,
}

impl ClientEntry {
    /// Create a new unidentified entry
    pub(super) fn new(id: ClientId, outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            identity: Identity::Unidentified,
            display_name: None,
            connected_at: Instant::now(),
            outbox,
        }
    }

    /// Queue a message without waiting
    ///
    /// Relays are fire-and-forget: a full or closed outbox drops the message.
    pub fn deliver(&self, message: ServerMessage) -> Delivery {
        match self.outbox.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Snapshot of the entry without the outbox
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Read-only snapshot of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Broker-assigned id
    pub id: ClientId,
    /// Current identity
    pub identity: Identity,
    /// Informational name from hello
    pub display_name: Option<String>,
    /// When the connection was accepted
    pub connected_at: Instant,
}
