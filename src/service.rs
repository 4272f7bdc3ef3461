//! Ledger Service
//!
//! Inbound synchronous API. Wires the store, the cache and the mutation
//! components together, owns the cache-aside read path and enforces the
//! caller-facing batch bounds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::account::store::lock_order;
use crate::account::{Account, AccountStore, NewAccount, TransferLogEntry};
use crate::cache::{BalanceCache, CacheInvalidator};
use crate::core_types::{AccountId, DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_BATCH_ITEMS};
use crate::error::LedgerError;
use crate::queue::{TransferMessage, TransferQueue};
use crate::transfer::{BatchItem, BatchProcessor, BatchResult, CreditAdjuster, TransferCoordinator};

/// Tunables of the service layer
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub cache_ttl: Duration,
    pub max_batch_items: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
        }
    }
}

pub struct LedgerService {
    store: Arc<dyn AccountStore>,
    cache: Arc<dyn BalanceCache>,
    invalidator: CacheInvalidator,
    coordinator: Arc<TransferCoordinator>,
    adjuster: CreditAdjuster,
    batch: BatchProcessor,
    queue: Option<Arc<dyn TransferQueue>>,
    options: ServiceOptions,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn BalanceCache>,
        invalidator: CacheInvalidator,
        options: ServiceOptions,
    ) -> Self {
        Self {
            coordinator: Arc::new(TransferCoordinator::new(store.clone(), invalidator.clone())),
            adjuster: CreditAdjuster::new(store.clone(), invalidator.clone()),
            batch: BatchProcessor::new(store.clone(), invalidator.clone()),
            store,
            cache,
            invalidator,
            queue: None,
            options,
        }
    }

    /// Enable [`LedgerService::transfer_async`]
    pub fn with_queue(mut self, queue: Arc<dyn TransferQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Shared coordinator, for the queue consumer
    pub fn coordinator(&self) -> Arc<TransferCoordinator> {
        self.coordinator.clone()
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Balance of one account, served from the cache when possible
    pub async fn get_balance(&self, id: AccountId) -> Result<Decimal, LedgerError> {
        match self.cache.get(id).await {
            Ok(Some(balance)) => {
                debug!(account_id = id, "Balance cache hit");
                return Ok(balance);
            }
            Ok(None) => {}
            Err(e) => warn!(account_id = id, error = %e, "Balance cache read failed"),
        }

        let epoch = self.invalidator.epoch(id);
        let balance = self.store.get_balance(id).await?;
        self.refill(id, epoch, balance).await;
        Ok(balance)
    }

    /// Cache `balance` read at `epoch`, unless a writer has moved past it
    ///
    /// A writer may commit and finish its invalidation while the `set` is in
    /// flight, so the epoch is checked again afterwards and the entry dropped
    /// if it moved.
    async fn refill(&self, id: AccountId, epoch: u64, balance: Decimal) {
        if self.invalidator.epoch(id) != epoch {
            debug!(account_id = id, "Balance changed during read, skipping refill");
            return;
        }
        if let Err(e) = self.cache.set(id, balance, self.options.cache_ttl).await {
            warn!(account_id = id, error = %e, "Balance cache refill failed");
            return;
        }
        if self.invalidator.epoch(id) != epoch {
            debug!(account_id = id, "Balance changed during refill, dropping entry");
            if let Err(e) = self.cache.invalidate(id).await {
                warn!(account_id = id, error = %e, "Failed to drop raced cache entry");
            }
        }
    }

    /// Balances of every existing id in `ids`; unknown ids are absent
    pub async fn get_multiple_balances(
        &self,
        ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Decimal>, LedgerError> {
        let ids = lock_order(ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut balances = match self.cache.get_many(&ids).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Balance cache batch read failed");
                HashMap::new()
            }
        };

        let missing: Vec<(AccountId, u64)> = ids
            .iter()
            .filter(|id| !balances.contains_key(*id))
            .map(|id| (*id, self.invalidator.epoch(*id)))
            .collect();
        if missing.is_empty() {
            return Ok(balances);
        }

        let missing_ids: Vec<AccountId> = missing.iter().map(|(id, _)| *id).collect();
        let loaded = self.store.get_balances(&missing_ids).await?;

        let refill: HashMap<AccountId, Decimal> = missing
            .iter()
            .filter(|(id, epoch)| self.invalidator.epoch(*id) == *epoch)
            .filter_map(|(id, _)| loaded.get(id).map(|balance| (*id, *balance)))
            .collect();
        if !refill.is_empty() {
            match self.cache.set_many(&refill, self.options.cache_ttl).await {
                Ok(()) => {
                    let raced: Vec<AccountId> = missing
                        .iter()
                        .filter(|(id, epoch)| {
                            refill.contains_key(id) && self.invalidator.epoch(*id) != *epoch
                        })
                        .map(|(id, _)| *id)
                        .collect();
                    if !raced.is_empty() {
                        debug!(count = raced.len(), "Balances changed during refill, dropping entries");
                        if let Err(e) = self.cache.invalidate_many(&raced).await {
                            warn!(error = %e, "Failed to drop raced cache entries");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Balance cache batch refill failed"),
            }
        }

        balances.extend(loaded);
        Ok(balances)
    }

    /// Transfers sent by `sender_id` on one UTC day, newest first
    pub async fn query_transfer_log(
        &self,
        sender_id: AccountId,
        date: NaiveDate,
    ) -> Result<Vec<TransferLogEntry>, LedgerError> {
        self.store.query_transfer_log(sender_id, date).await
    }

    /// One account record, read from the store
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store.get_account(id).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.store.list_accounts().await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_account(&self, account: NewAccount) -> Result<Account, LedgerError> {
        self.store.create_account(account).await
    }

    pub async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferLogEntry, LedgerError> {
        self.coordinator.transfer(sender_id, receiver_id, amount).await
    }

    /// Publish a transfer for the queue consumer and return immediately
    ///
    /// Only the amount is validated here; account checks happen when the
    /// consumer applies the message.
    pub async fn transfer_async(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::non_positive(amount));
        }
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| LedgerError::QueueFailure("no transfer queue configured".to_string()))?;

        queue
            .publish(&TransferMessage::new(sender_id, receiver_id, amount)?)
            .await?;
        info!(sender_id, receiver_id, amount = %amount, "Transfer queued");
        Ok(())
    }

    pub async fn add_credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.adjuster.add_credit(id, amount).await
    }

    /// Apply a batch of signed adjustments
    ///
    /// # Errors
    /// - `EmptyBatch` / `BatchTooLarge` before anything is touched
    /// - `StoreFailure` if the enclosing transaction fails; no item persists
    pub async fn process_batch(&self, items: &[BatchItem]) -> Result<Vec<BatchResult>, LedgerError> {
        if items.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        if items.len() > self.options.max_batch_items {
            return Err(LedgerError::BatchTooLarge {
                max: self.options.max_batch_items,
                actual: items.len(),
            });
        }
        self.batch.process(items).await
    }
}
