//! Balance cache (cache-aside)
//!
//! The cache is advisory: a miss sends the caller to the durable store, and a
//! failed cache call is logged and treated like a miss. Writers never update
//! cached balances, they invalidate them through [`CacheInvalidator`].
//! Entries expire after a TTL even when an invalidation is lost.

pub mod invalidator;
pub mod memory;
pub mod redis_cache;

pub use invalidator::CacheInvalidator;
pub use memory::MemoryBalanceCache;
pub use redis_cache::RedisBalanceCache;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{AccountId, BALANCE_KEY_PREFIX};

/// Cache failures; never surfaced to ledger callers
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cached value for account {account_id} is not a decimal: {value}")]
    Decode { account_id: AccountId, value: String },

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Last-known balances keyed by account id
#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// `Ok(None)` is a miss
    async fn get(&self, id: AccountId) -> Result<Option<Decimal>, CacheError>;

    async fn set(&self, id: AccountId, balance: Decimal, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, id: AccountId) -> Result<(), CacheError>;

    /// Hits only; missing ids are absent from the map
    async fn get_many(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Decimal>, CacheError>;

    async fn set_many(
        &self,
        balances: &HashMap<AccountId, Decimal>,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn invalidate_many(&self, ids: &[AccountId]) -> Result<(), CacheError>;
}

/// Cache key for one account (`account_balance:{id}`)
pub fn balance_key(id: AccountId) -> String {
    format!("{}{}", BALANCE_KEY_PREFIX, id)
}
