//! Batch Processor
//!
//! Applies a list of independent single-account adjustments inside one store
//! transaction. Items fail individually; only a store failure aborts the
//! whole batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::credit::apply_delta;
use crate::account::AccountStore;
use crate::cache::CacheInvalidator;
use crate::core_types::AccountId;
use crate::error::LedgerError;

/// One signed adjustment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub account_id: AccountId,
    pub amount: Decimal,
}

impl BatchItem {
    pub fn new(account_id: AccountId, amount: Decimal) -> Self {
        Self { account_id, amount }
    }
}

/// Outcome of one [`BatchItem`], reported in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn succeeded(item: &BatchItem) -> Self {
        Self {
            account_id: item.account_id,
            amount: item.amount,
            success: true,
            error: None,
        }
    }

    fn failed(item: &BatchItem, err: &LedgerError) -> Self {
        Self {
            account_id: item.account_id,
            amount: item.amount,
            success: false,
            error: Some(err.to_string()),
        }
    }
}

/// Batch Processor - partial-success adjustments in one transaction
pub struct BatchProcessor {
    store: Arc<dyn AccountStore>,
    invalidator: CacheInvalidator,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn AccountStore>, invalidator: CacheInvalidator) -> Self {
        Self { store, invalidator }
    }

    /// Process `items` in order and return one result per item
    ///
    /// Every distinct existing account is locked up front in ascending id
    /// order. Items on the same account see the running balance left by the
    /// items before them. Size bounds are enforced by the caller.
    pub async fn process(&self, items: &[BatchItem]) -> Result<Vec<BatchResult>, LedgerError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<AccountId> = items.iter().map(|item| item.account_id).collect();

        let mut tx = self.store.begin().await?;
        let mut balances = tx.lock_balances(&ids).await?;

        let mut results = Vec::with_capacity(items.len());
        let mut updated = BTreeSet::new();

        for item in items {
            let outcome = match balances.get(&item.account_id).copied() {
                Some(current) => {
                    apply_delta(tx.as_mut(), item.account_id, item.amount, current).await
                }
                None => Err(LedgerError::AccountNotFound(item.account_id)),
            };

            match outcome {
                Ok(balance) => {
                    balances.insert(item.account_id, balance);
                    updated.insert(item.account_id);
                    results.push(BatchResult::succeeded(item));
                }
                Err(e) if e.is_caller_error() => {
                    debug!(account_id = item.account_id, error = %e, "Batch item rejected");
                    results.push(BatchResult::failed(item, &e));
                }
                Err(e) => {
                    error!(account_id = item.account_id, error = %e, "Batch aborted");
                    return Err(e);
                }
            }
        }

        tx.commit().await?;

        let succeeded = updated.len();
        let updated: Vec<AccountId> = updated.into_iter().collect();
        self.invalidator.dispatch(&updated);

        info!(
            items = items.len(),
            accounts_updated = succeeded,
            failed = results.iter().filter(|r| !r.success).count(),
            "Batch committed"
        );
        Ok(results)
    }
}
