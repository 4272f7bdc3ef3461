//! Ledger Error Types
//!
//! One taxonomy for every caller-visible failure of the engine.
//! Cache failures live in [`crate::cache::CacheError`] and never convert
//! into a [`LedgerError`].

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::AccountId;

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // === Caller Errors ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds on account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    #[error("Batch must contain at least one item")]
    EmptyBatch,

    #[error("Batch too large: {actual} items (max {max})")]
    BatchTooLarge { max: usize, actual: usize },

    // === System Errors ===
    #[error("Store failure: {0}")]
    StoreFailure(String),

    #[error("Queue failure: {0}")]
    QueueFailure(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidAccount(_) => "INVALID_ACCOUNT",
            LedgerError::EmptyBatch => "EMPTY_BATCH",
            LedgerError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            LedgerError::StoreFailure(_) => "STORE_FAILURE",
            LedgerError::QueueFailure(_) => "QUEUE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidAccount(_)
            | LedgerError::EmptyBatch
            | LedgerError::BatchTooLarge { .. } => 400,
            LedgerError::AccountNotFound(_) => 404,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::StoreFailure(_) => 500,
            LedgerError::QueueFailure(_) => 503,
        }
    }

    /// Caller errors are surfaced as-is; everything else is a system fault
    pub fn is_caller_error(&self) -> bool {
        self.http_status() < 500
    }

    pub(crate) fn non_positive(amount: Decimal) -> Self {
        LedgerError::InvalidAmount(format!("amount must be positive, got {}", amount))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::StoreFailure(e.to_string())
    }
}
