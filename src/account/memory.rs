//! In-memory account store
//!
//! Each account row sits behind its own `tokio::sync::Mutex`, which plays the
//! part of a row lock: a transaction holds the guards of every row it locked
//! until it commits or is dropped. Writes are staged and only applied at
//! commit, so a dropped transaction leaves nothing behind.
//!
//! Used by the test suites and by the `memory` store backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::{Account, NewAccount, NewTransferLog, TransferLogEntry, day_bounds};
use super::store::{AccountStore, StoreTx, lock_order};
use crate::core_types::AccountId;
use crate::error::LedgerError;

#[derive(Debug)]
struct AccountRow {
    name: String,
    balance: Decimal,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    rows: DashMap<AccountId, Arc<Mutex<AccountRow>>>,
    log: Mutex<Vec<TransferLogEntry>>,
    next_account_id: AtomicU64,
    next_log_id: AtomicI64,
    fail_next_begin: AtomicBool,
    fail_next_log_append: AtomicBool,
    fail_next_commit: AtomicBool,
}

impl Inner {
    fn row(&self, id: AccountId) -> Option<Arc<Mutex<AccountRow>>> {
        self.rows.get(&id).map(|r| r.value().clone())
    }
}

/// Account store kept entirely in process memory
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    inner: Arc<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `begin()` fail with a store failure
    pub fn fail_next_begin(&self) {
        self.inner.fail_next_begin.store(true, Ordering::SeqCst);
    }

    /// Make the next transfer log append fail with a store failure
    pub fn fail_next_log_append(&self) {
        self.inner.fail_next_log_append.store(true, Ordering::SeqCst);
    }

    /// Make the next commit fail; the transaction is rolled back
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Every committed log entry, in commit order
    pub async fn transfer_logs(&self) -> Vec<TransferLogEntry> {
        self.inner.log.lock().await.clone()
    }

    pub fn account_count(&self) -> usize {
        self.inner.rows.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_balance(&self, id: AccountId) -> Result<Decimal, LedgerError> {
        let row = self
            .inner
            .row(id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        let balance = row.lock().await.balance;
        Ok(balance)
    }

    async fn get_balances(
        &self,
        ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Decimal>, LedgerError> {
        let mut balances = HashMap::with_capacity(ids.len());
        for id in lock_order(ids) {
            if let Some(row) = self.inner.row(id) {
                balances.insert(id, row.lock().await.balance);
            }
        }
        Ok(balances)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let row = self
            .inner
            .row(id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        let row = row.lock().await;
        Ok(Account {
            id,
            name: row.name.clone(),
            balance: row.balance,
            created_at: row.created_at,
        })
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut rows: Vec<(AccountId, Arc<Mutex<AccountRow>>)> = self
            .inner
            .rows
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        rows.sort_unstable_by_key(|(id, _)| *id);

        let mut accounts = Vec::with_capacity(rows.len());
        for (id, row) in rows {
            let row = row.lock().await;
            accounts.push(Account {
                id,
                name: row.name.clone(),
                balance: row.balance,
                created_at: row.created_at,
            });
        }
        Ok(accounts)
    }

    async fn set_balance(&self, id: AccountId, balance: Decimal) -> Result<(), LedgerError> {
        if balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "balance must not be negative, got {}",
                balance
            )));
        }
        let row = self
            .inner
            .row(id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        row.lock().await.balance = balance;
        Ok(())
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, LedgerError> {
        let (name, balance) = account.validate()?;
        let id = self.inner.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = Utc::now();

        self.inner.rows.insert(
            id,
            Arc::new(Mutex::new(AccountRow {
                name: name.as_str().to_string(),
                balance,
                created_at,
            })),
        );

        tracing::info!(account_id = id, "Account created");
        Ok(Account {
            id,
            name: name.into_string(),
            balance,
            created_at,
        })
    }

    async fn append_transfer_log(
        &self,
        entry: NewTransferLog,
    ) -> Result<TransferLogEntry, LedgerError> {
        let mut tx = self.begin().await?;
        let entry = tx.append_transfer_log(entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn query_transfer_log(
        &self,
        sender_id: AccountId,
        date: NaiveDate,
    ) -> Result<Vec<TransferLogEntry>, LedgerError> {
        let (start, end) = day_bounds(date);
        let mut entries: Vec<TransferLogEntry> = self
            .inner
            .log
            .lock()
            .await
            .iter()
            .filter(|e| e.sender_id == sender_id && e.created_at >= start && e.created_at < end)
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, LedgerError> {
        if self.inner.fail_next_begin.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StoreFailure(
                "injected failure: begin".to_string(),
            ));
        }

        Ok(Box::new(MemoryStoreTx {
            inner: self.inner.clone(),
            guards: BTreeMap::new(),
            staged: HashMap::new(),
            pending_log: Vec::new(),
        }))
    }
}

/// In-memory transaction holding row guards until commit or drop
pub struct MemoryStoreTx {
    inner: Arc<Inner>,
    guards: BTreeMap<AccountId, OwnedMutexGuard<AccountRow>>,
    staged: HashMap<AccountId, Decimal>,
    pending_log: Vec<TransferLogEntry>,
}

impl MemoryStoreTx {
    fn current(&self, id: AccountId) -> Option<Decimal> {
        self.staged
            .get(&id)
            .copied()
            .or_else(|| self.guards.get(&id).map(|g| g.balance))
    }
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn lock_balances(
        &mut self,
        ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Decimal>, LedgerError> {
        let mut balances = HashMap::new();

        for id in lock_order(ids) {
            if !self.guards.contains_key(&id) {
                let Some(row) = self.inner.row(id) else {
                    continue;
                };
                let guard = row.lock_owned().await;
                self.guards.insert(id, guard);
            }
            if let Some(balance) = self.current(id) {
                balances.insert(id, balance);
            }
        }

        Ok(balances)
    }

    async fn write_balance(&mut self, id: AccountId, balance: Decimal) -> Result<(), LedgerError> {
        if !self.guards.contains_key(&id) {
            return Err(LedgerError::StoreFailure(format!(
                "account {} written without holding its row lock",
                id
            )));
        }
        if balance < Decimal::ZERO {
            return Err(LedgerError::StoreFailure(format!(
                "check constraint violated: account {} balance {}",
                id, balance
            )));
        }
        self.staged.insert(id, balance);
        Ok(())
    }

    async fn append_transfer_log(
        &mut self,
        entry: NewTransferLog,
    ) -> Result<TransferLogEntry, LedgerError> {
        if self.inner.fail_next_log_append.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StoreFailure(
                "injected failure: transfer log append".to_string(),
            ));
        }

        let id = self.inner.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = entry.with_id(id);
        self.pending_log.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = *self;

        if this.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StoreFailure(
                "injected failure: commit".to_string(),
            ));
        }

        let mut log = this.inner.log.lock().await;
        for (id, balance) in this.staged.drain() {
            if let Some(guard) = this.guards.get_mut(&id) {
                guard.balance = balance;
            }
        }
        log.append(&mut this.pending_log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn store_with(balances: &[Decimal]) -> (MemoryAccountStore, Vec<AccountId>) {
        let store = MemoryAccountStore::new();
        let mut ids = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            let account = store
                .create_account(NewAccount::new(format!("acct-{}", i), *balance))
                .await
                .unwrap();
            ids.push(account.id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, ids) = store_with(&[dec!(10), dec!(20)]).await;
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.get_balance(2).await.unwrap(), dec!(20));
        assert_eq!(
            store.get_balance(99).await.unwrap_err(),
            LedgerError::AccountNotFound(99)
        );
    }

    #[tokio::test]
    async fn test_get_account() {
        let (store, ids) = store_with(&[dec!(10), dec!(20)]).await;

        let account = store.get_account(ids[1]).await.unwrap();
        assert_eq!(account.name, "acct-1");
        assert_eq!(account.balance, dec!(20));
        assert_eq!(store.list_accounts().await.unwrap()[1], account);

        assert_eq!(
            store.get_account(99).await.unwrap_err(),
            LedgerError::AccountNotFound(99)
        );
    }

    #[tokio::test]
    async fn test_get_balances_skips_unknown() {
        let (store, _) = store_with(&[dec!(1), dec!(2)]).await;
        let balances = store.get_balances(&[2, 7, 1]).await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[&1], dec!(1));
        assert!(!balances.contains_key(&7));
    }

    #[tokio::test]
    async fn test_set_balance() {
        let (store, _) = store_with(&[dec!(1)]).await;
        store.set_balance(1, dec!(9)).await.unwrap();
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(9));
        assert!(matches!(
            store.set_balance(1, dec!(-1)).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(
            store.set_balance(5, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(5)
        );
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let (store, _) = store_with(&[dec!(10)]).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_balances(&[1]).await.unwrap();
            tx.write_balance(1, dec!(0)).await.unwrap();
        }
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(10));
        assert!(store.transfer_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_rolls_back() {
        let (store, _) = store_with(&[dec!(10)]).await;
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.lock_balances(&[1]).await.unwrap();
        tx.write_balance(1, dec!(3)).await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(LedgerError::StoreFailure(_))
        ));

        assert_eq!(store.get_balance(1).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_write_requires_lock() {
        let (store, _) = store_with(&[dec!(10)]).await;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.write_balance(1, dec!(1)).await,
            Err(LedgerError::StoreFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_tx() {
        let (store, _) = store_with(&[dec!(10)]).await;

        let mut first = store.begin().await.unwrap();
        first.lock_balances(&[1]).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let balances = tx.lock_balances(&[1]).await.unwrap();
                balances[&1]
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        first.write_balance(1, dec!(4)).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(contender.await.unwrap(), dec!(4));
    }

    #[tokio::test]
    async fn test_query_transfer_log_order() {
        let (store, _) = store_with(&[dec!(10), dec!(0)]).await;
        let now = Utc::now();

        for amount in [dec!(1), dec!(2), dec!(3)] {
            store
                .append_transfer_log(NewTransferLog {
                    sender_id: 1,
                    receiver_id: 2,
                    amount,
                    sender_balance_before: dec!(10),
                    receiver_balance_before: dec!(0),
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let logs = store.query_transfer_log(1, now.date_naive()).await.unwrap();
        let ids: Vec<_> = logs.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        assert!(store
            .query_transfer_log(2, now.date_naive())
            .await
            .unwrap()
            .is_empty());
    }
}
