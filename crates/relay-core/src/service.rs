//! The chat service aggregate.
//!
//! [`ChatService`] owns the registry, history, inboxes and the distributor
//! task. One instance is created per server and shared by reference (usually
//! behind an `Arc`) with every connection.

use crate::distributor::{Distributor, Envelope};
use crate::history::{History, HistorySnapshot};
use crate::inbox::{Inbox, WaitState};
use crate::message::{join_notice, Message};
use crate::registry::{ClientId, ClientRecord, Registry};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Errors returned by [`ChatService`] operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The client ID was never registered.
    #[error("Unknown client ID: {0}")]
    UnknownClient(ClientId),

    /// The distributor task has exited.
    #[error("Distributor is not running")]
    DistributorStopped,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of the inbound queue. `send` waits when it is full.
    pub inbound_capacity: usize,
    /// Capacity of each client inbox. Deliveries beyond it are dropped.
    pub inbox_capacity: usize,
    /// Deadline of a long-poll `wait`.
    pub wait_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 10,
            inbox_capacity: 5,
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    /// Newly assigned client ID.
    pub client_id: ClientId,
    /// Echoed display name.
    pub name: String,
    /// History as it was when the client was added.
    pub history: HistorySnapshot,
}

/// Outcome of a long-poll wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A message arrived before the deadline.
    Delivered(Message),
    /// The deadline elapsed. The caller should wait again.
    TimedOut,
}

/// Service statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    /// Registered clients.
    pub clients: usize,
    /// Messages in the history.
    pub history_len: usize,
    /// Inbox deliveries made since start.
    pub delivered: u64,
    /// Inbox deliveries dropped because the inbox was full.
    pub dropped: u64,
    /// Clients with a wait in flight.
    pub waiting: usize,
    /// Whether the distributor task is alive.
    pub distributor_running: bool,
}

/// State guarded by the single service lock.
#[derive(Debug, Default)]
pub(crate) struct RelayState {
    pub(crate) registry: Registry,
    pub(crate) history: History,
    pub(crate) inboxes: HashMap<ClientId, Arc<Inbox>>,
}

/// State shared between the service and its distributor.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<RelayState>,
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped: AtomicU64,
    /// Held for writing to stall the distributor after it dequeues a message.
    #[cfg(test)]
    pub(crate) distribution_gate: tokio::sync::RwLock<()>,
}

/// The message relay.
///
/// Construct it once, inside a tokio runtime, and share it. Dropping the
/// service closes the inbound queue, which ends the distributor task.
pub struct ChatService {
    shared: Arc<Shared>,
    inbound: mpsc::Sender<Envelope>,
    distributor: JoinHandle<()>,
    config: RelayConfig,
}

impl ChatService {
    /// Create a service with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a service and start its distributor.
    ///
    /// Zero capacities are raised to 1.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn with_config(mut config: RelayConfig) -> Self {
        config.inbound_capacity = config.inbound_capacity.max(1);
        config.inbox_capacity = config.inbox_capacity.max(1);
        info!("Creating chat service with config: {:?}", config);

        let shared = Arc::new(Shared::default());
        let (inbound, rx) = mpsc::channel(config.inbound_capacity);
        let distributor = tokio::spawn(Distributor::new(Arc::clone(&shared), rx).run());

        Self {
            shared,
            inbound,
            distributor,
            config,
        }
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Register a client.
    ///
    /// Creates the client's record and inbox together, snapshots the history,
    /// then announces the client to every live inbox, its own included.
    /// Returns once the announcement has been sequenced, so a later
    /// registration always finds it in its snapshot.
    ///
    /// # Cancellation
    ///
    /// The client is registered as soon as this future is first polled.
    /// Dropping the future before it completes (for example while the inbound
    /// queue is full) leaves the client registered, but its join notice may
    /// never be sequenced.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DistributorStopped`] if the distributor is gone.
    pub async fn register(&self, name: impl Into<String>) -> Result<Registration, RelayError> {
        let name = name.into();

        let (record, history) = {
            let mut state = self.shared.state.lock();
            let record = state.registry.register(name.clone());
            state.inboxes.insert(
                record.id.clone(),
                Arc::new(Inbox::new(self.config.inbox_capacity)),
            );
            let history = state.history.snapshot();
            (record, history)
        };

        info!(client = %record.id, name = %name, history = history.len(), "Client registered");

        let (sequenced, done) = oneshot::channel();
        self.enqueue(Envelope {
            message: join_notice(&name),
            sequenced: Some(sequenced),
        })
        .await?;
        done.await.map_err(|_| RelayError::DistributorStopped)?;

        Ok(Registration {
            client_id: record.id,
            name,
            history,
        })
    }

    /// Queue a message from a registered client.
    ///
    /// Waits while the inbound queue is full. Success means the message was
    /// queued, not that any client received it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownClient`] if `client_id` is not registered.
    pub async fn send(&self, client_id: &str, text: impl Into<String>) -> Result<(), RelayError> {
        let from = self
            .shared
            .state
            .lock()
            .registry
            .display_name(client_id)
            .map(str::to_owned)
            .ok_or_else(|| RelayError::UnknownClient(client_id.to_string()))?;

        debug!(client = %client_id, from = %from, "Queueing message");
        self.enqueue(Envelope::new(Message::new(from, text))).await
    }

    /// Long-poll the client's inbox with the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownClient`] immediately if `client_id` is not
    /// registered.
    pub async fn wait(&self, client_id: &str) -> Result<WaitOutcome, RelayError> {
        self.wait_with_timeout(client_id, self.config.wait_timeout)
            .await
    }

    /// Long-poll the client's inbox for at most `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownClient`] immediately if `client_id` is not
    /// registered.
    pub async fn wait_with_timeout(
        &self,
        client_id: &str,
        deadline: Duration,
    ) -> Result<WaitOutcome, RelayError> {
        let inbox = self.inbox(client_id)?;

        let outcome = match inbox.recv_timeout(deadline).await {
            Some(message) => WaitOutcome::Delivered(message),
            None => WaitOutcome::TimedOut,
        };

        debug!(
            client = %client_id,
            delivered = matches!(outcome, WaitOutcome::Delivered(_)),
            "Wait finished"
        );
        Ok(outcome)
    }

    /// Whether a wait is in flight for the client.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownClient`] if `client_id` is not registered.
    pub fn wait_state(&self, client_id: &str) -> Result<WaitState, RelayError> {
        Ok(self.inbox(client_id)?.state())
    }

    /// Current history snapshot.
    #[must_use]
    pub fn history(&self) -> HistorySnapshot {
        self.shared.state.lock().history.snapshot()
    }

    /// Look up a registered client.
    #[must_use]
    pub fn client(&self, client_id: &str) -> Option<ClientRecord> {
        self.shared.state.lock().registry.get(client_id).cloned()
    }

    /// Get service statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let (clients, history_len, waiting) = {
            let state = self.shared.state.lock();
            let waiting = state
                .inboxes
                .values()
                .filter(|inbox| inbox.state() == WaitState::Waiting)
                .count();
            (state.registry.len(), state.history.len(), waiting)
        };

        RelayStats {
            clients,
            history_len,
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            waiting,
            distributor_running: !self.distributor.is_finished(),
        }
    }

    fn inbox(&self, client_id: &str) -> Result<Arc<Inbox>, RelayError> {
        self.shared
            .state
            .lock()
            .inboxes
            .get(client_id)
            .cloned()
            .ok_or_else(|| RelayError::UnknownClient(client_id.to_string()))
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), RelayError> {
        self.inbound
            .send(envelope)
            .await
            .map_err(|_| RelayError::DistributorStopped)
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new()
    }
}
