//! In-process transfer queue on a tokio channel

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{TransferMessage, TransferQueue};
use crate::error::LedgerError;

/// Unbounded FIFO queue for tests and the `memory` queue backend
pub struct MemoryTransferQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    poll_timeout: Duration,
}

impl MemoryTransferQueue {
    pub fn new(poll_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            poll_timeout,
        }
    }

    /// Enqueue an arbitrary payload, bypassing message encoding
    pub fn push_raw(&self, payload: impl Into<Vec<u8>>) -> Result<(), LedgerError> {
        self.tx
            .send(payload.into())
            .map_err(|_| LedgerError::QueueFailure("queue closed".to_string()))
    }
}

#[async_trait]
impl TransferQueue for MemoryTransferQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, message: &TransferMessage) -> Result<(), LedgerError> {
        self.push_raw(message.encode()?)
    }

    async fn next(&self) -> Result<Option<Vec<u8>>, LedgerError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(self.poll_timeout, rx.recv()).await {
            Ok(payload) => Ok(payload),
            Err(_) => Ok(None),
        }
    }
}
