//! Core types used throughout the ledger
//!
//! Type aliases shared by the store, cache and transfer modules.

/// Account ID - opaque, immutable after assignment.
///
/// Stored as `BIGINT` in PostgreSQL; values above `i64::MAX` are rejected
/// at the store boundary.
pub type AccountId = u64;

/// Transfer log entry ID - assigned monotonically by the store.
pub type TransferLogId = i64;

/// Redis key prefix for cached balances (`account_balance:{id}`)
pub const BALANCE_KEY_PREFIX: &str = "account_balance:";

/// Default cache TTL: 30 minutes
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;

/// Caller-facing batch cap
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 1000;
