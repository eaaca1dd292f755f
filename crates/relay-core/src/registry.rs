//! Client registry.

use serde::Serialize;
use std::collections::HashMap;

/// A client identifier, rendered as `C1`, `C2`, ...
pub type ClientId = String;

/// A registered client. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    /// Unique identifier.
    pub id: ClientId,
    /// Name shown as the sender of this client's messages.
    pub display_name: String,
}

/// Maps client IDs to display names.
///
/// IDs are assigned from a monotonically increasing counter and never
/// reused. Records are never removed.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, ClientRecord>,
    last_id: u64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under `display_name` and return its record.
    ///
    /// Any string is accepted, including the empty string and names already
    /// in use.
    pub fn register(&mut self, display_name: impl Into<String>) -> ClientRecord {
        self.last_id += 1;
        let record = ClientRecord {
            id: format!("C{}", self.last_id),
            display_name: display_name.into(),
        };
        self.clients.insert(record.id.clone(), record.clone());
        record
    }

    /// Look up a client record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ClientRecord> {
        self.clients.get(id)
    }

    /// Look up the display name of a client.
    #[must_use]
    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.clients.get(id).map(|c| c.display_name.as_str())
    }

    /// Check if a client is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no client has registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = Registry::new();

        let alice = registry.register("Alice");
        let bob = registry.register("Bob");

        assert_eq!(alice.id, "C1");
        assert_eq!(bob.id, "C2");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.display_name("C2"), Some("Bob"));
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let mut registry = Registry::new();

        let a = registry.register("");
        let b = registry.register("");

        assert_ne!(a.id, b.id);
        assert_eq!(registry.display_name(&a.id), Some(""));
    }

    #[test]
    fn test_unknown_client() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains("C1"));
        assert!(registry.get("C1").is_none());
    }
}
