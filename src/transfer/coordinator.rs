//! Transfer Coordinator
//!
//! Moves credit between two accounts in one store transaction: lock both
//! rows, check funds, write both balances, append the log entry, commit.
//! Cache invalidation is dispatched only after the commit succeeded.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::account::{AccountStore, NewTransferLog, TransferLogEntry};
use crate::account::store::lock_order;
use crate::cache::CacheInvalidator;
use crate::core_types::AccountId;
use crate::error::LedgerError;

/// Transfer Coordinator - single atomic debit/credit pair
pub struct TransferCoordinator {
    store: Arc<dyn AccountStore>,
    invalidator: CacheInvalidator,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn AccountStore>, invalidator: CacheInvalidator) -> Self {
        Self { store, invalidator }
    }

    /// Transfer `amount` from `sender_id` to `receiver_id`
    ///
    /// Self-transfers are accepted: the single row is locked, the balance is
    /// left unchanged and a log entry is still written.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `AccountNotFound` if either side does not exist (sender checked first)
    /// - `InsufficientFunds` if the sender balance is below `amount`
    /// - `StoreFailure` on any store error; nothing is persisted
    pub async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferLogEntry, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::non_positive(amount));
        }

        let mut tx = self.store.begin().await?;
        let balances = tx.lock_balances(&[sender_id, receiver_id]).await?;

        let sender_before = *balances
            .get(&sender_id)
            .ok_or(LedgerError::AccountNotFound(sender_id))?;
        let receiver_before = *balances
            .get(&receiver_id)
            .ok_or(LedgerError::AccountNotFound(receiver_id))?;

        if sender_before < amount {
            debug!(
                sender_id,
                available = %sender_before,
                requested = %amount,
                "Transfer rejected: insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                account_id: sender_id,
                available: sender_before,
                requested: amount,
            });
        }

        if sender_id != receiver_id {
            let receiver_after = receiver_before.checked_add(amount).ok_or_else(|| {
                LedgerError::InvalidAmount(format!(
                    "balance of account {} would overflow",
                    receiver_id
                ))
            })?;
            tx.write_balance(sender_id, sender_before - amount).await?;
            tx.write_balance(receiver_id, receiver_after).await?;
        }

        let entry = tx
            .append_transfer_log(NewTransferLog {
                sender_id,
                receiver_id,
                amount,
                sender_balance_before: sender_before,
                receiver_balance_before: receiver_before,
                created_at: Utc::now(),
            })
            .await?;

        tx.commit().await?;

        info!(
            log_id = entry.id,
            sender_id,
            receiver_id,
            amount = %amount,
            "Transfer committed"
        );

        self.invalidator
            .dispatch(&lock_order(&[sender_id, receiver_id]));
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{MemoryAccountStore, NewAccount};
    use crate::cache::MemoryBalanceCache;
    use rust_decimal_macros::dec;

    async fn setup(balances: &[Decimal]) -> (TransferCoordinator, MemoryAccountStore, CacheInvalidator) {
        let store = MemoryAccountStore::new();
        for (i, balance) in balances.iter().enumerate() {
            store
                .create_account(NewAccount::new(format!("user-{}", i + 1), *balance))
                .await
                .unwrap();
        }
        let (invalidator, _) = CacheInvalidator::spawn(Arc::new(MemoryBalanceCache::new()), 16);
        let coordinator = TransferCoordinator::new(Arc::new(store.clone()), invalidator.clone());
        (coordinator, store, invalidator)
    }

    #[tokio::test]
    async fn test_transfer_moves_balance_and_logs() {
        let (coordinator, store, _) = setup(&[dec!(100), dec!(0)]).await;

        let entry = coordinator.transfer(1, 2, dec!(40)).await.unwrap();
        assert_eq!(entry.sender_balance_before, dec!(100));
        assert_eq!(entry.receiver_balance_before, dec!(0));
        assert_eq!(entry.amount, dec!(40));

        assert_eq!(store.get_balance(1).await.unwrap(), dec!(60));
        assert_eq!(store.get_balance(2).await.unwrap(), dec!(40));
        assert_eq!(store.transfer_logs().await, vec![entry]);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let (coordinator, store, _) = setup(&[dec!(10), dec!(0)]).await;

        for amount in [dec!(0), dec!(-5)] {
            let err = coordinator.transfer(1, 2, amount).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
        assert!(store.transfer_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_accounts() {
        let (coordinator, store, _) = setup(&[dec!(10)]).await;

        assert_eq!(
            coordinator.transfer(1, 42, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(42)
        );
        assert_eq!(
            coordinator.transfer(42, 1, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(42)
        );
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_trace() {
        let (coordinator, store, _) = setup(&[dec!(30), dec!(5)]).await;

        let err = coordinator.transfer(1, 2, dec!(30.01)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: 1,
                available: dec!(30),
                requested: dec!(30.01),
            }
        );
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(30));
        assert_eq!(store.get_balance(2).await.unwrap(), dec!(5));
        assert!(store.transfer_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_balance_drains_to_zero() {
        let (coordinator, store, _) = setup(&[dec!(12.5), dec!(0)]).await;
        coordinator.transfer(1, 2, dec!(12.5)).await.unwrap();
        assert_eq!(store.get_balance(1).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_self_transfer_is_noop_with_log() {
        let (coordinator, store, invalidator) = setup(&[dec!(50)]).await;

        let entry = coordinator.transfer(1, 1, dec!(20)).await.unwrap();
        assert_eq!(entry.sender_balance_before, dec!(50));
        assert_eq!(entry.receiver_balance_before, dec!(50));
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(50));
        assert_eq!(invalidator.epoch(1), 1);
    }

    #[tokio::test]
    async fn test_self_transfer_still_checks_funds() {
        let (coordinator, _, _) = setup(&[dec!(5)]).await;
        assert!(matches!(
            coordinator.transfer(1, 1, dec!(6)).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidation_only_after_commit() {
        let (coordinator, store, invalidator) = setup(&[dec!(10), dec!(0)]).await;

        store.fail_next_commit();
        assert!(coordinator.transfer(1, 2, dec!(1)).await.is_err());
        assert_eq!(invalidator.epoch(1), 0);
        assert_eq!(invalidator.epoch(2), 0);

        coordinator.transfer(1, 2, dec!(1)).await.unwrap();
        assert_eq!(invalidator.epoch(1), 1);
        assert_eq!(invalidator.epoch(2), 1);
    }
}
