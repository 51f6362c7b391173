//! # Transaction Pool (ql-02)
//!
//! Holds verified client transactions until they are committed in a block.
//!
//! ## Data Structures
//!
//! - `by_hash`: O(1) lookup by transaction hash
//! - `by_priority`: O(log n) priority queue (BTreeSet), highest fee first
//! - `recently_committed`: bounded memory of committed hashes
//!
//! ## Invariants
//!
//! - No duplicate hashes
//! - Only transactions whose signature verifies are admitted
//! - A committed hash is never re-admitted while remembered
//! - Selection never removes; removal happens on commit

pub mod domain;

pub use domain::{AddOutcome, MempoolConfig, MempoolError, TransactionPool};
