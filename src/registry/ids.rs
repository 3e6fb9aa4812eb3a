//! Identifier types for connections and sites

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker-assigned identifier of one transport connection
///
/// Generated on accept and stable for the lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ClientId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identifier a site publishes under (e.g. "dock-3")
///
/// Provided by the publishing endpoint, never generated by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Create a new site id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_unique() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_client_id_serializes_as_plain_string() {
        let id = ClientId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_site_id_display() {
        let site = SiteId::from("dock-3");
        assert_eq!(site.to_string(), "dock-3");
        assert_eq!(site.as_str(), "dock-3");
        assert!(!site.is_empty());
        assert!(SiteId::new("").is_empty());
    }
}
