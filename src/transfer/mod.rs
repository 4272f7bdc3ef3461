//! Balance mutations
//!
//! Every path that changes a balance lives here and follows the same shape:
//!
//! ```text
//! begin -> lock rows (ascending id) -> check -> write -> [log] -> commit -> invalidate
//! ```
//!
//! # Safety Invariants
//!
//! 1. **No negative balance**: checks run against balances read under the row lock
//! 2. **Atomicity**: any failure before commit drops the transaction, nothing persists
//! 3. **Invalidate-after-commit**: cache entries are dispatched for deletion only
//!    once the store has committed, and a failed invalidation never fails the call

pub mod batch;
pub mod coordinator;
pub mod credit;


// Re-exports for convenience
pub use batch::{BatchItem, BatchProcessor, BatchResult};
pub use coordinator::TransferCoordinator;
pub use credit::{CreditAdjuster, apply_delta};
