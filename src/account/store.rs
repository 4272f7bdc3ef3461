//! Account store abstraction
//!
//! The durable store is the only authority on balances. Every read-then-write
//! of a balance goes through a [`StoreTx`], whose row locks serialize
//! concurrent writers to the same account.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::models::{Account, NewAccount, NewTransferLog, TransferLogEntry};
use crate::core_types::AccountId;
use crate::error::LedgerError;

/// Durable table of accounts plus the append-only transfer log
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Current balance of one account
    async fn get_balance(&self, id: AccountId) -> Result<Decimal, LedgerError>;

    /// Balances of every existing id in `ids`; unknown ids are absent
    async fn get_balances(
        &self,
        ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Decimal>, LedgerError>;

    /// One account record; `AccountNotFound` when absent
    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// All accounts ordered by id
    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError>;

    /// Overwrite a balance outside of any transfer
    async fn set_balance(&self, id: AccountId, balance: Decimal) -> Result<(), LedgerError>;

    async fn create_account(&self, account: NewAccount) -> Result<Account, LedgerError>;

    /// Append one log entry in its own transaction
    async fn append_transfer_log(
        &self,
        entry: NewTransferLog,
    ) -> Result<TransferLogEntry, LedgerError>;

    /// Entries sent by `sender_id` on the given UTC day, newest first
    async fn query_transfer_log(
        &self,
        sender_id: AccountId,
        date: NaiveDate,
    ) -> Result<Vec<TransferLogEntry>, LedgerError>;

    /// Open a durable transaction
    async fn begin(&self) -> Result<Box<dyn StoreTx>, LedgerError>;
}

/// One durable transaction
///
/// Dropping a transaction without calling [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    /// Lock the rows of every existing id, in ascending id order, and return
    /// their balances. Duplicates are locked once; unknown ids are absent.
    async fn lock_balances(
        &mut self,
        ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Decimal>, LedgerError>;

    /// Write the balance of a row locked by this transaction
    async fn write_balance(&mut self, id: AccountId, balance: Decimal) -> Result<(), LedgerError>;

    async fn append_transfer_log(
        &mut self,
        entry: NewTransferLog,
    ) -> Result<TransferLogEntry, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Canonical lock order: ascending, deduplicated
pub fn lock_order(ids: &[AccountId]) -> Vec<AccountId> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
