//! Credit Ledger worker
//!
//! Runs the queue consumer that applies asynchronously submitted transfers,
//! together with the cache invalidation task.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌─────────────┐    ┌──────────┐
//! │  Queue   │───▶│ Consumer │───▶│ Coordinator │───▶│  Store   │
//! └──────────┘    └──────────┘    └──────┬──────┘    └──────────┘
//!                                        │ invalidate
//!                                        ▼
//!                                  ┌──────────┐
//!                                  │  Cache   │
//!                                  └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use credit_ledger::account::schema::init_schema;
use credit_ledger::config::{AppConfig, CacheBackend, QueueBackend, StoreBackend};
use credit_ledger::db::Database;
use credit_ledger::logging::init_logging;
use credit_ledger::queue::{MemoryTransferQueue, RedisTransferQueue};
use credit_ledger::{
    AccountStore, BalanceCache, CacheInvalidator, LedgerService, MemoryAccountStore,
    MemoryBalanceCache, PgAccountStore, RedisBalanceCache, TransferConsumer, TransferQueue,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn AccountStore>> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let url = config
                .store
                .postgres_url
                .as_deref()
                .context("store.postgres_url missing")?;
            let db = Database::connect(
                url,
                config.store.max_connections,
                config.store.acquire_timeout(),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            db.health_check()
                .await
                .context("PostgreSQL health check failed")?;
            init_schema(db.pool()).await?;
            Ok(Arc::new(PgAccountStore::new(db.pool().clone())))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory account store; balances are lost on exit");
            Ok(Arc::new(MemoryAccountStore::new()))
        }
    }
}

async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn BalanceCache>> {
    match config.cache.backend {
        CacheBackend::Redis => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .context("cache.redis_url missing")?;
            let cache = RedisBalanceCache::connect(url)
                .await
                .context("Failed to connect balance cache")?;
            Ok(Arc::new(cache))
        }
        CacheBackend::Memory => Ok(Arc::new(MemoryBalanceCache::new())),
    }
}

/// Producer and consumer handles; Redis gets one connection each
async fn build_queues(
    config: &AppConfig,
) -> anyhow::Result<Option<(Arc<dyn TransferQueue>, Arc<dyn TransferQueue>)>> {
    let queue = &config.queue;
    match queue.backend {
        QueueBackend::Redis => {
            let url = queue.redis_url.as_deref().context("queue.redis_url missing")?;
            let producer =
                RedisTransferQueue::connect(url, queue.queue_name.clone(), queue.poll_timeout())
                    .await?;
            let consumer =
                RedisTransferQueue::connect(url, queue.queue_name.clone(), queue.poll_timeout())
                    .await?;
            Ok(Some((Arc::new(producer), Arc::new(consumer))))
        }
        QueueBackend::Memory => {
            let shared: Arc<dyn TransferQueue> =
                Arc::new(MemoryTransferQueue::new(queue.poll_timeout()));
            Ok(Some((shared.clone(), shared)))
        }
        QueueBackend::Disabled => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!("Starting credit ledger worker in {} mode", env);

    let store = build_store(&config).await?;
    let cache = build_cache(&config).await?;
    info!(store = store.name(), cache = cache.name(), "Backends ready");

    let (invalidator, invalidation_task) =
        CacheInvalidator::spawn(cache.clone(), config.cache.invalidation_queue);

    let mut service = LedgerService::new(
        store,
        cache,
        invalidator.clone(),
        config.service_options(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer_task = None;

    if let Some((producer, consumer_queue)) = build_queues(&config).await? {
        service = service.with_queue(producer);
        let consumer = TransferConsumer::new(consumer_queue, service.coordinator());
        consumer_task = Some(tokio::spawn(async move { consumer.run(shutdown_rx).await }));
    } else {
        info!("Transfer queue disabled");
    }

    info!("Worker started. Press CTRL+C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down worker...");

    let _ = shutdown_tx.send(true);
    if let Some(task) = consumer_task {
        match task.await {
            Ok(stats) => info!(
                applied = stats.applied,
                rejected = stats.rejected,
                malformed = stats.malformed,
                "Consumer drained"
            ),
            Err(e) => warn!(error = %e, "Consumer task failed"),
        }
    }

    invalidator.flush().await;
    drop(service);
    drop(invalidator);
    if tokio::time::timeout(Duration::from_secs(5), invalidation_task)
        .await
        .is_err()
    {
        warn!("Invalidation task did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}
