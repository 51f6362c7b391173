//! Error types for the ledger.

use shared_types::{hash_hex, Hash};

/// Transaction construction errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("Invalid {field}: {value} (must be a finite, non-negative amount)")]
    InvalidAmount { field: &'static str, value: f64 },
}

/// Ledger append and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid block index: expected {expected}, got {actual}")]
    IndexMismatch { expected: u64, actual: u64 },

    #[error("Previous hash mismatch: expected {}, got {}", hash_hex(.expected), hash_hex(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Invalid genesis block: {0}")]
    InvalidGenesis(&'static str),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
