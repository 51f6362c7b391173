//! Mempool configuration and value objects.

use serde::{Deserialize, Serialize};
use shared_types::Hash;
use std::cmp::Ordering;

/// Pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum pending transactions.
    pub capacity: usize,
    /// How many committed hashes are remembered for duplicate rejection.
    pub committed_memory: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            committed_memory: 10_000,
        }
    }
}

/// Result of a successful `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub hash: Hash,
    /// Pool size after insertion.
    pub pool_size: usize,
    /// Lower-fee transaction evicted to make room, if any.
    pub evicted: Option<Hash>,
}

/// Priority key: highest fee, then oldest timestamp, then hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PriorityKey {
    pub fee: u64,
    pub timestamp: u64,
    pub hash: Hash,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher fee = higher priority (so reverse comparison)
        other
            .fee
            .cmp(&self.fee)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
