//! Per-client inbox.
//!
//! An inbox is a bounded FIFO written only by the distributor and drained by
//! long-poll waits. Writes never block: when the inbox is full the message is
//! refused and the distributor moves on.

use crate::message::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// The inbox had no free slot for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Inbox full")]
pub struct InboxFull;

/// Whether a long-poll is currently outstanding on an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// No wait in flight.
    Idle,
    /// At least one wait is blocked on the inbox.
    Waiting,
}

/// A bounded, lossy message queue for one client.
#[derive(Debug)]
pub struct Inbox {
    sender: mpsc::Sender<Arc<Message>>,
    receiver: Mutex<mpsc::Receiver<Arc<Message>>>,
    waiters: AtomicUsize,
    capacity: usize,
}

impl Inbox {
    /// Create an inbox holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            waiters: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Enqueue without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`InboxFull`] if the message was dropped.
    pub fn offer(&self, message: Arc<Message>) -> Result<(), InboxFull> {
        // The receiver lives as long as `self`, so `Closed` cannot happen.
        self.sender.try_send(message).map_err(|_| InboxFull)
    }

    /// Wait up to `deadline` for the next message.
    ///
    /// Returns `None` if the deadline elapsed first. Dropping the returned
    /// future before it completes leaves queued messages in place.
    pub async fn recv_timeout(&self, deadline: Duration) -> Option<Message> {
        let _waiting = WaitingGuard::enter(&self.waiters);

        let recv = async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };

        match tokio::time::timeout(deadline, recv).await {
            Ok(Some(message)) => Some(Arc::try_unwrap(message).unwrap_or_else(|m| (*m).clone())),
            Ok(None) | Err(_) => None,
        }
    }

    /// Current long-poll state.
    #[must_use]
    pub fn state(&self) -> WaitState {
        if self.waiters.load(Ordering::Acquire) > 0 {
            WaitState::Waiting
        } else {
            WaitState::Idle
        }
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Check if no message is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Counts an outstanding wait for as long as it lives.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::AcqRel);
        Self(waiters)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
