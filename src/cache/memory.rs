//! In-process balance cache with per-entry expiry
//!
//! Entries live in a `cached::ExpiringValueCache`, which drops an expired
//! value on lookup and evicts least-recently-used entries past its capacity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cached::{CanExpire, Cached, ExpiringValueCache};
use rust_decimal::Decimal;

use super::{BalanceCache, CacheError};
use crate::core_types::AccountId;

/// Entries kept before the least recently used is evicted
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Entry {
    balance: Decimal,
    expires_at: Instant,
}

impl CanExpire for Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Inner {
    entries: Mutex<ExpiringValueCache<AccountId, Entry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_invalidations: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Balance cache held in process memory
///
/// Clones share the same entries. The failure switches make every call of
/// that kind return [`CacheError::Unavailable`] until switched off again.
#[derive(Clone)]
pub struct MemoryBalanceCache {
    inner: Arc<Inner>,
}

impl Default for MemoryBalanceCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` must be non-zero
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(ExpiringValueCache::with_size(capacity.max(1))),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                fail_invalidations: AtomicBool::new(false),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_invalidations(&self, fail: bool) {
        self.inner.fail_invalidations.store(fail, Ordering::SeqCst);
    }

    /// Live entry for `id`, bypassing the failure switches and counters
    pub fn peek(&self, id: AccountId) -> Option<Decimal> {
        let mut entries = self.entries().ok()?;
        entries.cache_get(&id).map(|e| e.balance)
    }

    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("injected failure: {}", op)));
        }
        Ok(())
    }

    fn entries(&self) -> Result<MutexGuard<'_, ExpiringValueCache<AccountId, Entry>>, CacheError> {
        self.inner
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }

    fn lookup(
        &self,
        entries: &mut ExpiringValueCache<AccountId, Entry>,
        id: AccountId,
    ) -> Option<Decimal> {
        let found = entries.cache_get(&id).map(|e| e.balance);
        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }
}

#[async_trait]
impl BalanceCache for MemoryBalanceCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: AccountId) -> Result<Option<Decimal>, CacheError> {
        Self::check(&self.inner.fail_reads, "get")?;
        let mut entries = self.entries()?;
        Ok(self.lookup(&mut entries, id))
    }

    async fn set(&self, id: AccountId, balance: Decimal, ttl: Duration) -> Result<(), CacheError> {
        Self::check(&self.inner.fail_writes, "set")?;
        let entry = Entry {
            balance,
            expires_at: Instant::now() + ttl,
        };
        self.entries()?.cache_set(id, entry);
        Ok(())
    }

    async fn invalidate(&self, id: AccountId) -> Result<(), CacheError> {
        Self::check(&self.inner.fail_invalidations, "invalidate")?;
        self.entries()?.cache_remove(&id);
        Ok(())
    }

    async fn get_many(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Decimal>, CacheError> {
        Self::check(&self.inner.fail_reads, "get_many")?;
        let mut entries = self.entries()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.lookup(&mut entries, *id).map(|b| (*id, b)))
            .collect())
    }

    async fn set_many(
        &self,
        balances: &HashMap<AccountId, Decimal>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        Self::check(&self.inner.fail_writes, "set_many")?;
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries()?;
        for (id, balance) in balances {
            entries.cache_set(
                *id,
                Entry {
                    balance: *balance,
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn invalidate_many(&self, ids: &[AccountId]) -> Result<(), CacheError> {
        Self::check(&self.inner.fail_invalidations, "invalidate_many")?;
        let mut entries = self.entries()?;
        for id in ids {
            entries.cache_remove(id);
        }
        Ok(())
    }
}
