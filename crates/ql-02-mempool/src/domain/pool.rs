//! # Transaction Pool
//!
//! INVARIANTS:
//! - `by_hash` and `by_priority` hold exactly the same transactions
//! - `recently_committed` never exceeds `committed_memory` entries

use super::entities::{AddOutcome, MempoolConfig, PriorityKey};
use super::errors::MempoolError;
use ql_01_ledger::Transaction;
use shared_types::{now_millis, short_hex, Hash};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug)]
struct PooledTransaction {
    tx: Transaction,
    /// Local receive time, unix milliseconds.
    received_at: u64,
}

/// Pending-transaction pool owned by one node.
#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    by_hash: HashMap<Hash, PooledTransaction>,
    by_priority: BTreeSet<PriorityKey>,
    committed_order: VecDeque<Hash>,
    recently_committed: HashSet<Hash>,
}

impl TransactionPool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_hash: HashMap::new(),
            by_priority: BTreeSet::new(),
            committed_order: VecDeque::new(),
            recently_committed: HashSet::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&Transaction> {
        self.by_hash.get(hash).map(|entry| &entry.tx)
    }

    /// Verify and admit a transaction.
    ///
    /// # Errors
    /// - `InvalidSignature` if the hash or signature does not verify
    /// - `AlreadyCommitted` if the hash was recently committed
    /// - `Duplicate` if the hash is already pooled
    /// - `PoolFull` if at capacity and the fee does not beat the lowest entry
    pub fn add(&mut self, tx: Transaction) -> Result<AddOutcome, MempoolError> {
        self.add_at(tx, now_millis())
    }

    /// `add` with an explicit receive time.
    pub fn add_at(&mut self, tx: Transaction, now: u64) -> Result<AddOutcome, MempoolError> {
        let hash = tx.hash;
        if !tx.verify() {
            return Err(MempoolError::InvalidSignature(hash));
        }
        if self.recently_committed.contains(&hash) {
            return Err(MempoolError::AlreadyCommitted(hash));
        }
        if self.by_hash.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }

        let mut evicted = None;
        if self.by_hash.len() >= self.config.capacity {
            evicted = Some(self.evict_for(&tx)?);
        }

        self.by_priority.insert(priority_of(&tx));
        self.by_hash.insert(
            hash,
            PooledTransaction {
                tx,
                received_at: now,
            },
        );
        debug!(tx = %short_hex(&hash), pool_size = self.by_hash.len(), "Transaction pooled");

        Ok(AddOutcome {
            hash,
            pool_size: self.by_hash.len(),
            evicted,
        })
    }

    /// Evict the lowest-priority entry if `incoming` pays a strictly higher fee.
    fn evict_for(&mut self, incoming: &Transaction) -> Result<Hash, MempoolError> {
        let full = MempoolError::PoolFull {
            capacity: self.config.capacity,
        };
        let Some(lowest) = self.by_priority.last().copied() else {
            return Err(full);
        };
        if incoming.fee.units() <= lowest.fee {
            return Err(full);
        }
        self.by_priority.remove(&lowest);
        self.by_hash.remove(&lowest.hash);
        debug!(tx = %short_hex(&lowest.hash), "Evicted lowest-fee transaction");
        Ok(lowest.hash)
    }

    /// Up to `max` transactions in priority order. Does not remove them.
    pub fn select_batch(&self, max: usize) -> Vec<Transaction> {
        self.by_priority
            .iter()
            .take(max)
            .filter_map(|key| self.by_hash.get(&key.hash))
            .map(|entry| entry.tx.clone())
            .collect()
    }

    /// Drop committed transactions and remember their hashes.
    ///
    /// Returns how many were pooled.
    pub fn remove_committed<'a>(&mut self, hashes: impl IntoIterator<Item = &'a Hash>) -> usize {
        let mut removed = 0;
        for hash in hashes {
            if let Some(entry) = self.by_hash.remove(hash) {
                self.by_priority.remove(&priority_of(&entry.tx));
                removed += 1;
            }
            self.remember_committed(*hash);
        }
        removed
    }

    fn remember_committed(&mut self, hash: Hash) {
        if self.config.committed_memory == 0 || !self.recently_committed.insert(hash) {
            return;
        }
        self.committed_order.push_back(hash);
        while self.committed_order.len() > self.config.committed_memory {
            if let Some(expired) = self.committed_order.pop_front() {
                self.recently_committed.remove(&expired);
            }
        }
    }

    /// Age in milliseconds of the longest-waiting transaction.
    pub fn oldest_age(&self, now: u64) -> Option<u64> {
        self.by_hash
            .values()
            .map(|entry| now.saturating_sub(entry.received_at))
            .max()
    }
}

fn priority_of(tx: &Transaction) -> PriorityKey {
    PriorityKey {
        fee: tx.fee.units(),
        timestamp: tx.timestamp,
        hash: tx.hash,
    }
}
