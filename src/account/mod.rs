//! Account store module
//!
//! Durable accounts table plus the append-only transfer log, with a
//! PostgreSQL implementation and an in-memory one.

pub mod memory;
pub mod models;
pub mod repository;
pub mod schema;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use memory::MemoryAccountStore;
pub use models::{Account, NewAccount, NewTransferLog, TransferLogEntry};
pub use repository::PgAccountStore;
pub use store::{AccountStore, StoreTx};
pub use validation::{AccountName, ValidationError};

// Re-export Database from top-level db module
pub use crate::db::Database;
