//! Mempool error types.

use shared_types::{short_hex, Hash};
use thiserror::Error;

/// Errors that can occur in mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    /// Hash mismatch or signature does not verify against the sender key.
    #[error("Invalid transaction signature: {}", short_hex(.0))]
    InvalidSignature(Hash),

    /// Transaction already in pool.
    #[error("Duplicate transaction: {}", short_hex(.0))]
    Duplicate(Hash),

    /// Transaction was already committed in a block.
    #[error("Transaction already committed: {}", short_hex(.0))]
    AlreadyCommitted(Hash),

    /// Pool is at capacity and the transaction does not outbid the lowest entry.
    #[error("Mempool full: capacity {capacity}")]
    PoolFull { capacity: usize },
}
