//! Relay error types
//!
//! Per-message failures. The router logs them and drops the message; none of
//! them affects any connection other than the sender, and none closes it.

use crate::protocol::ParseError;
use crate::registry::{ClientId, Role, SiteId};

/// Error type for a single inbound message
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Frame could not be decoded
    #[error(transparent)]
    Malformed(#[from] ParseError),

    /// Frame was binary and not valid UTF-8
    #[error("binary frame is not UTF-8")]
    NotUtf8,

    /// `hello` with a role other than site or operator
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// `hello` as site without a site id
    #[error("site hello without siteId")]
    MissingSiteId,

    /// Sender has not sent `hello`
    #[error("client has not identified")]
    NotIdentified,

    /// Sender is no longer registered
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Sender's role does not allow this message
    #[error("{kind} requires role {expected}")]
    WrongRole {
        /// Message type
        kind: &'static str,
        /// Role the message requires
        expected: Role,
    },

    /// Addressed site is not published
    #[error("site {0} is offline")]
    SiteOffline(SiteId),

    /// Operator is not watching the site
    #[error("not watching site {0}")]
    NotWatching(SiteId),

    /// Sender was superseded as publisher of its site
    #[error("not the current owner of site {0}")]
    NotSiteOwner(SiteId),

    /// `ice` without the field that names its target
    #[error("ice without a target")]
    MissingTarget,
}

impl RelayError {
    /// Violation name for an explicit `error` reply, if this error gets one
    pub fn reply_code(&self) -> Option<&'static str> {
        match self {
            RelayError::WrongRole {
                kind: "watch",
                expected: Role::Operator,
            } => Some("not-operator"),
            _ => None,
        }
    }

    /// Whether this is undecodable input as opposed to a protocol violation
    pub fn is_malformed(&self) -> bool {
        matches!(self, RelayError::Malformed(_) | RelayError::NotUtf8)
    }
}
