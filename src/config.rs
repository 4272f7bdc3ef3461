use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core_types::{DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_BATCH_ITEMS};
use crate::queue::DEFAULT_QUEUE_NAME;
use crate::service::ServiceOptions;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            postgres_url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl StoreConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Balance entry TTL (default 30 minutes)
    pub ttl_secs: u64,
    /// Capacity of the invalidation queue
    pub invalidation_queue: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            invalidation_queue: 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub queue_name: String,
    pub poll_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Disabled,
            redis_url: None,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            poll_timeout_secs: 1,
        }
    }
}

impl QueueConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_batch_items: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Backends that need a URL must have one
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.postgres_url.is_none() {
            anyhow::bail!("store.postgres_url is required for the postgres backend");
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            anyhow::bail!("cache.redis_url is required for the redis backend");
        }
        if self.queue.backend == QueueBackend::Redis && self.queue.redis_url.is_none() {
            anyhow::bail!("queue.redis_url is required for the redis backend");
        }
        if self.limits.max_batch_items == 0 {
            anyhow::bail!("limits.max_batch_items must be at least 1");
        }
        Ok(())
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            max_batch_items: self.limits.max_batch_items,
        }
    }
}
