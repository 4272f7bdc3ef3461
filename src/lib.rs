//! Credit Ledger - Balance Transfer & Consistency Engine
//!
//! Per-account balances with atomic transfers, an append-only transfer log,
//! a cache-aside balance cache and partial-success batch adjustments.
//!
//! # Modules
//!
//! - [`core_types`] - Shared ids and defaults
//! - [`error`] - [`LedgerError`] taxonomy
//! - [`account`] - Account store trait, PostgreSQL and in-memory stores
//! - [`cache`] - Balance cache trait, Redis and in-memory caches, invalidation task
//! - [`transfer`] - Transfer coordinator, credit adjuster, batch processor
//! - [`queue`] - Async transfer message, queues and consumer
//! - [`service`] - Inbound synchronous API
//! - [`config`] / [`logging`] / [`db`] - Process plumbing

// Core types - must be first!
pub mod core_types;
pub mod error;

// Engine
pub mod account;
pub mod cache;
pub mod queue;
pub mod service;
pub mod transfer;

// Plumbing
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use account::{Account, AccountStore, MemoryAccountStore, NewAccount, PgAccountStore, TransferLogEntry};
pub use cache::{BalanceCache, CacheInvalidator, MemoryBalanceCache, RedisBalanceCache};
pub use core_types::AccountId;
pub use error::LedgerError;
pub use queue::{TransferConsumer, TransferMessage, TransferQueue};
pub use service::{LedgerService, ServiceOptions};
pub use transfer::{BatchItem, BatchProcessor, BatchResult, CreditAdjuster, TransferCoordinator};
