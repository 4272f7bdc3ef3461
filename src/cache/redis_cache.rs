use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use rust_decimal::Decimal;

use super::{BalanceCache, CacheError, balance_key};
use crate::core_types::AccountId;

/// Redis-backed balance cache
///
/// Values are decimal strings stored with `SET EX`; batched variants use a
/// single pipeline round trip.
#[derive(Clone)]
pub struct RedisBalanceCache {
    conn: MultiplexedConnection,
}

impl RedisBalanceCache {
    /// Open a multiplexed connection shared by every clone of this cache
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("Redis balance cache connected");
        Ok(Self { conn })
    }
}

fn decode(account_id: AccountId, value: String) -> Result<Decimal, CacheError> {
    Decimal::from_str(&value).map_err(|_| CacheError::Decode { account_id, value })
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, id: AccountId) -> Result<Option<Decimal>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(balance_key(id)).await?;
        value.map(|v| decode(id, v)).transpose()
    }

    async fn set(&self, id: AccountId, balance: Decimal, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(balance_key(id), balance.to_string(), ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn invalidate(&self, id: AccountId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(balance_key(id)).await?;
        Ok(())
    }

    async fn get_many(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Decimal>, CacheError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.get(balance_key(*id));
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        let mut hits = HashMap::with_capacity(ids.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(value) = value else { continue };
            match decode(*id, value) {
                Ok(balance) => {
                    hits.insert(*id, balance);
                }
                Err(e) => tracing::warn!(account_id = id, error = %e, "Ignoring undecodable cache entry"),
            }
        }
        Ok(hits)
    }

    async fn set_many(
        &self,
        balances: &HashMap<AccountId, Decimal>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if balances.is_empty() {
            return Ok(());
        }

        let secs = ttl_secs(ttl);
        let mut pipe = redis::pipe();
        for (id, balance) in balances {
            pipe.set_ex(balance_key(*id), balance.to_string(), secs)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn invalidate_many(&self, ids: &[AccountId]) -> Result<(), CacheError> {
        if ids.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = ids.iter().map(|id| balance_key(*id)).collect();
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379/15";

    #[test]
    fn test_decode() {
        assert_eq!(decode(1, "12.50".into()).unwrap(), dec!(12.50));
        assert!(matches!(
            decode(1, "nan?".into()),
            Err(CacheError::Decode { account_id: 1, .. })
        ));
    }

    #[test]
    fn test_ttl_secs_floor() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(1800)), 1800);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_round_trip() {
        let cache = RedisBalanceCache::connect(TEST_REDIS_URL).await.unwrap();
        let ttl = Duration::from_secs(60);

        cache.set(900_001, dec!(40.25), ttl).await.unwrap();
        assert_eq!(cache.get(900_001).await.unwrap(), Some(dec!(40.25)));

        cache.invalidate(900_001).await.unwrap();
        assert_eq!(cache.get(900_001).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_batched_variants() {
        let cache = RedisBalanceCache::connect(TEST_REDIS_URL).await.unwrap();
        let ttl = Duration::from_secs(60);

        let balances = HashMap::from([(900_010, dec!(1)), (900_011, dec!(2))]);
        cache.set_many(&balances, ttl).await.unwrap();

        let hits = cache.get_many(&[900_010, 900_011, 900_012]).await.unwrap();
        assert_eq!(hits, balances);

        cache.invalidate_many(&[900_010, 900_011]).await.unwrap();
        assert!(cache.get_many(&[900_010, 900_011]).await.unwrap().is_empty());
    }
}
