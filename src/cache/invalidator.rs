//! Background cache invalidation
//!
//! Mutations hand the ids they touched to [`CacheInvalidator::dispatch`],
//! which returns immediately. One task drains the queue and deletes the
//! cache entries. A failed delete is logged and left to the TTL.
//!
//! Every dispatch bumps a per-account epoch before queueing. The read path
//! samples the epoch before its store read and only refills the cache when
//! the epoch is unchanged afterwards.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::BalanceCache;
use crate::core_types::AccountId;

enum Command {
    Invalidate(Vec<AccountId>),
    Flush(oneshot::Sender<()>),
}

/// Sender side of the invalidation queue; cheap to clone
#[derive(Clone)]
pub struct CacheInvalidator {
    tx: mpsc::Sender<Command>,
    epochs: Arc<DashMap<AccountId, u64>>,
}

impl CacheInvalidator {
    /// Start the invalidation task
    ///
    /// The task exits once every `CacheInvalidator` clone is dropped.
    pub fn spawn(cache: Arc<dyn BalanceCache>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(cache, rx));
        (
            Self {
                tx,
                epochs: Arc::new(DashMap::new()),
            },
            handle,
        )
    }

    /// Current epoch of an account; 0 until its first invalidation
    pub fn epoch(&self, id: AccountId) -> u64 {
        self.epochs.get(&id).map(|e| *e).unwrap_or(0)
    }

    /// Queue invalidation of `ids` without waiting for it
    pub fn dispatch(&self, ids: &[AccountId]) {
        if ids.is_empty() {
            return;
        }

        for id in ids {
            *self.epochs.entry(*id).or_insert(0) += 1;
        }

        match self.tx.try_send(Command::Invalidate(ids.to_vec())) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(account_ids = ?ids, "Invalidation queue full, relying on TTL");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(account_ids = ?ids, "Invalidation task stopped, relying on TTL");
            }
        }
    }

    /// Wait until every invalidation dispatched before this call has run
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run(cache: Arc<dyn BalanceCache>, mut rx: mpsc::Receiver<Command>) {
    debug!(cache = cache.name(), "Cache invalidation task started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Invalidate(ids) => {
                let result = if ids.len() == 1 {
                    cache.invalidate(ids[0]).await
                } else {
                    cache.invalidate_many(&ids).await
                };
                match result {
                    Ok(()) => debug!(account_ids = ?ids, "Cache entries invalidated"),
                    Err(e) => warn!(account_ids = ?ids, error = %e, "Cache invalidation failed"),
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("Cache invalidation task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBalanceCache;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_dispatch_then_flush_removes_entries() {
        let cache = MemoryBalanceCache::new();
        cache.set(1, dec!(1), TTL).await.unwrap();
        cache.set(2, dec!(2), TTL).await.unwrap();
        cache.set(3, dec!(3), TTL).await.unwrap();

        let (invalidator, _handle) = CacheInvalidator::spawn(Arc::new(cache.clone()), 8);
        invalidator.dispatch(&[1]);
        invalidator.dispatch(&[2, 3]);
        invalidator.flush().await;

        assert!(cache.peek(1).is_none());
        assert!(cache.peek(2).is_none());
        assert!(cache.peek(3).is_none());
    }

    #[tokio::test]
    async fn test_epoch_bumps_per_dispatch() {
        let (invalidator, _handle) =
            CacheInvalidator::spawn(Arc::new(MemoryBalanceCache::new()), 8);
        assert_eq!(invalidator.epoch(5), 0);

        invalidator.dispatch(&[5, 6]);
        invalidator.dispatch(&[5]);
        assert_eq!(invalidator.epoch(5), 2);
        assert_eq!(invalidator.epoch(6), 1);
        assert_eq!(invalidator.epoch(7), 0);
    }

    #[tokio::test]
    async fn test_failed_invalidation_does_not_stop_task() {
        let cache = MemoryBalanceCache::new();
        cache.set(1, dec!(1), TTL).await.unwrap();
        cache.set(2, dec!(2), TTL).await.unwrap();

        let (invalidator, _handle) = CacheInvalidator::spawn(Arc::new(cache.clone()), 8);

        cache.fail_invalidations(true);
        invalidator.dispatch(&[1]);
        invalidator.flush().await;
        assert_eq!(cache.peek(1), Some(dec!(1)));

        cache.fail_invalidations(false);
        invalidator.dispatch(&[2]);
        invalidator.flush().await;
        assert!(cache.peek(2).is_none());
    }

    #[tokio::test]
    async fn test_task_exits_when_senders_dropped() {
        let (invalidator, handle) =
            CacheInvalidator::spawn(Arc::new(MemoryBalanceCache::new()), 1);
        drop(invalidator);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("invalidation task should stop")
            .unwrap();
    }
}
