//! Append-only history log.

use crate::message::Message;
use serde::Serialize;
use std::sync::Arc;

/// Every message the distributor has sequenced, in sequence order.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<Arc<Message>>,
}

impl History {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its 1-based sequence number.
    pub fn append(&mut self, message: Arc<Message>) -> u64 {
        self.entries.push(message);
        self.entries.len() as u64
    }

    /// Copy the current contents.
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot(self.entries.iter().map(|m| Message::clone(m)).collect())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been sequenced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A point-in-time copy of the history, owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HistorySnapshot(Vec<Message>);

impl HistorySnapshot {
    /// The messages in sequence order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Number of messages in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the messages.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    /// Take ownership of the messages.
    #[must_use]
    pub fn into_vec(self) -> Vec<Message> {
        self.0
    }
}

impl IntoIterator for HistorySnapshot {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a HistorySnapshot {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_returns_sequence() {
        let mut history = History::new();
        assert!(history.is_empty());

        assert_eq!(history.append(Arc::new(Message::new("a", "1"))), 1);
        assert_eq!(history.append(Arc::new(Message::new("b", "2"))), 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut history = History::new();
        history.append(Arc::new(Message::new("a", "1")));

        let snapshot = history.snapshot();
        history.append(Arc::new(Message::new("b", "2")));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.messages()[0].text, "1");
        assert_eq!(history.snapshot().len(), 2);
    }
}
