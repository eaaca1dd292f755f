//! The distributor task.
//!
//! Exactly one distributor runs per [`ChatService`](crate::ChatService). It is
//! the only consumer of the inbound queue, the only writer of the history and
//! the only producer into inboxes, so every inbox sees messages in history
//! order (possibly with gaps where deliveries were dropped).

use crate::message::Message;
use crate::service::Shared;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// An inbound message awaiting sequencing.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) message: Message,
    /// Notified with the sequence number once the message is in the history.
    pub(crate) sequenced: Option<oneshot::Sender<u64>>,
}

impl Envelope {
    pub(crate) fn new(message: Message) -> Self {
        Self {
            message,
            sequenced: None,
        }
    }
}

/// Sequential consumer of the inbound queue.
pub struct Distributor {
    shared: Arc<Shared>,
    inbound: mpsc::Receiver<Envelope>,
}

impl Distributor {
    pub(crate) fn new(shared: Arc<Shared>, inbound: mpsc::Receiver<Envelope>) -> Self {
        Self { shared, inbound }
    }

    /// Run until the inbound queue closes.
    ///
    /// The queue closes only when the owning service is dropped.
    pub async fn run(mut self) {
        info!("Distributor started");

        while let Some(envelope) = self.inbound.recv().await {
            #[cfg(test)]
            let _open = self.shared.distribution_gate.read().await;

            let seq = self.distribute(envelope.message);
            if let Some(sequenced) = envelope.sequenced {
                // The registering caller may have given up; nothing to do then.
                let _ = sequenced.send(seq);
            }
        }

        info!("Distributor stopped");
    }

    /// Append to history and offer to every live inbox.
    ///
    /// The shared lock is held across both steps so a concurrent registration
    /// sees each message either in its snapshot or in its inbox, never both.
    fn distribute(&self, message: Message) -> u64 {
        let message = Arc::new(message);
        let mut delivered = 0u64;
        let mut dropped = 0u64;

        let seq = {
            let mut state = self.shared.state.lock();
            let seq = state.history.append(Arc::clone(&message));

            for (client_id, inbox) in &state.inboxes {
                match inbox.offer(Arc::clone(&message)) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(
                            client = %client_id,
                            seq,
                            from = %message.from,
                            error = %e,
                            "Dropping message for client"
                        );
                        dropped += 1;
                    }
                }
            }

            // Counted under the lock so stats never lag behind a delivery.
            self.shared.delivered.fetch_add(delivered, Ordering::Relaxed);
            self.shared.dropped.fetch_add(dropped, Ordering::Relaxed);
            seq
        };

        debug!(seq, from = %message.from, recipients = delivered, dropped, "Distributed message");
        seq
    }
}
