//! Transfer Consumer
//!
//! Background loop that drains the transfer queue into the coordinator.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{TransferMessage, TransferQueue};
use crate::account::TransferLogEntry;
use crate::error::LedgerError;
use crate::transfer::TransferCoordinator;

/// Counters reported when the consumer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub applied: u64,
    pub rejected: u64,
    pub malformed: u64,
}

/// Transfer Consumer - forwards queued messages verbatim to the coordinator
pub struct TransferConsumer {
    queue: Arc<dyn TransferQueue>,
    coordinator: Arc<TransferCoordinator>,
}

impl TransferConsumer {
    pub fn new(queue: Arc<dyn TransferQueue>, coordinator: Arc<TransferCoordinator>) -> Self {
        Self { queue, coordinator }
    }

    /// Run the transfer one decoded message describes
    pub async fn handle(&self, message: &TransferMessage) -> Result<TransferLogEntry, LedgerError> {
        let amount = message.decimal_amount()?;
        self.coordinator
            .transfer(message.sender_id, message.receiver_id, amount)
            .await
    }

    /// Run until `shutdown` turns true
    ///
    /// Shutdown is checked between polls, so it takes effect within one
    /// queue poll timeout. A message already taken off the queue is always
    /// processed before the loop exits.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(queue = self.queue.name(), "Transfer consumer started");
        let mut stats = ConsumerStats::default();

        while !*shutdown.borrow() {
            let payload = match self.queue.next().await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Queue poll failed");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    continue;
                }
            };

            let message = match TransferMessage::decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    stats.malformed += 1;
                    warn!(error = %e, "Dropping malformed transfer message");
                    continue;
                }
            };

            match self.handle(&message).await {
                Ok(entry) => {
                    stats.applied += 1;
                    debug!(log_id = entry.id, "Queued transfer applied");
                }
                Err(e) => {
                    stats.rejected += 1;
                    warn!(
                        sender_id = message.sender_id,
                        receiver_id = message.receiver_id,
                        amount = message.amount,
                        code = e.code(),
                        error = %e,
                        "Queued transfer rejected"
                    );
                }
            }
        }

        info!(
            applied = stats.applied,
            rejected = stats.rejected,
            malformed = stats.malformed,
            "Transfer consumer stopped"
        );
        stats
    }
}
