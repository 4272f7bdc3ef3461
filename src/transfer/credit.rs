//! Credit Adjuster
//!
//! Single-account balance changes. [`CreditAdjuster::add_credit`] is the
//! public grant path; [`apply_delta`] is the signed primitive shared with
//! the batch processor. Both run under the account's row lock.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::account::{AccountStore, StoreTx};
use crate::cache::CacheInvalidator;
use crate::core_types::AccountId;
use crate::error::LedgerError;

/// Apply a signed `delta` to a row already locked by `tx`
///
/// `current` is the balance the caller read under that lock. Returns the
/// new balance. Business-rule failures write nothing, so the transaction
/// stays usable for other rows.
pub async fn apply_delta(
    tx: &mut dyn StoreTx,
    id: AccountId,
    delta: Decimal,
    current: Decimal,
) -> Result<Decimal, LedgerError> {
    if delta.is_zero() {
        return Err(LedgerError::InvalidAmount(
            "adjustment must not be zero".to_string(),
        ));
    }

    let updated = current.checked_add(delta).ok_or_else(|| {
        LedgerError::InvalidAmount(format!("balance of account {} would overflow", id))
    })?;

    if updated < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds {
            account_id: id,
            available: current,
            requested: -delta,
        });
    }

    tx.write_balance(id, updated).await?;
    Ok(updated)
}

/// Credit Adjuster - grants on one account
pub struct CreditAdjuster {
    store: Arc<dyn AccountStore>,
    invalidator: CacheInvalidator,
}

impl CreditAdjuster {
    pub fn new(store: Arc<dyn AccountStore>, invalidator: CacheInvalidator) -> Self {
        Self { store, invalidator }
    }

    /// Add a positive `amount` to one account and return the new balance
    pub async fn add_credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::non_positive(amount));
        }

        let mut tx = self.store.begin().await?;
        let balances = tx.lock_balances(&[id]).await?;
        let current = *balances.get(&id).ok_or(LedgerError::AccountNotFound(id))?;

        let updated = apply_delta(tx.as_mut(), id, amount, current).await?;
        tx.commit().await?;

        info!(account_id = id, amount = %amount, balance = %updated, "Credit added");
        self.invalidator.dispatch(&[id]);
        Ok(updated)
    }
}
