//! The append-only chain.

use super::block::Block;
use super::error::{LedgerError, LedgerResult};
use shared_types::{short_hex, Hash, NodeId, ZERO_HASH};
use std::collections::HashSet;
use tracing::debug;

/// Ordered blocks starting at genesis.
///
/// INVARIANTS:
/// - `blocks[0]` is genesis (index 0, zero previous hash)
/// - `blocks[i].index == i`
/// - `blocks[i].prev_hash == hashes[i - 1]`
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    /// Cached `blocks[i].hash()`.
    hashes: Vec<Hash>,
    transactions: HashSet<Hash>,
}

impl Ledger {
    /// The genesis block proposed by `proposer`.
    ///
    /// Timestamp 0 and no transactions, so every node built with the same
    /// proposer produces the same genesis hash.
    pub fn genesis(proposer: &NodeId) -> Block {
        Block::new(0, ZERO_HASH, Vec::new(), 0, proposer.clone())
    }

    /// Start a ledger from an explicit genesis block.
    pub fn new(genesis: Block) -> LedgerResult<Self> {
        if genesis.index != 0 {
            return Err(LedgerError::InvalidGenesis("index must be 0"));
        }
        if genesis.prev_hash != ZERO_HASH {
            return Err(LedgerError::InvalidGenesis("previous hash must be zero"));
        }
        let hash = genesis.hash();
        let transactions = genesis.transaction_hashes().collect();
        Ok(Self {
            blocks: vec![genesis],
            hashes: vec![hash],
            transactions,
        })
    }

    /// Start a ledger from `Ledger::genesis(proposer)`.
    pub fn with_genesis(proposer: &NodeId) -> Self {
        let genesis = Self::genesis(proposer);
        let hash = genesis.hash();
        Self {
            blocks: vec![genesis],
            hashes: vec![hash],
            transactions: HashSet::new(),
        }
    }

    /// Append `block` after the tail.
    ///
    /// The index is checked first, then the previous hash. On error the
    /// ledger is unchanged.
    pub fn append(&mut self, block: Block) -> LedgerResult<()> {
        let expected = self.height() + 1;
        if block.index != expected {
            return Err(LedgerError::IndexMismatch {
                expected,
                actual: block.index,
            });
        }
        let tail_hash = self.tail_hash();
        if block.prev_hash != tail_hash {
            return Err(LedgerError::HashMismatch {
                expected: tail_hash,
                actual: block.prev_hash,
            });
        }

        let hash = block.hash();
        debug!(
            index = block.index,
            hash = %short_hex(&hash),
            txs = block.transactions.len(),
            "Block appended"
        );
        self.transactions.extend(block.transaction_hashes());
        self.hashes.push(hash);
        self.blocks.push(block);
        Ok(())
    }

    pub fn tail(&self) -> &Block {
        // blocks always holds genesis
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tail_hash(&self) -> Hash {
        self.hashes[self.hashes.len() - 1]
    }

    /// Index of the tail block.
    pub fn height(&self) -> u64 {
        self.tail().index
    }

    /// Number of blocks including genesis.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always `false`; genesis is never removed.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn hash_at(&self, index: u64) -> Option<Hash> {
        usize::try_from(index).ok().and_then(|i| self.hashes.get(i).copied())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn genesis_hash(&self) -> Hash {
        self.hashes[0]
    }

    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.transactions.contains(hash)
    }

    /// Re-check every linkage invariant from genesis.
    pub fn verify_chain(&self) -> LedgerResult<()> {
        for (i, window) in self.blocks.windows(2).enumerate() {
            let (parent, child) = (&window[0], &window[1]);
            let expected = i as u64 + 1;
            if child.index != expected {
                return Err(LedgerError::IndexMismatch {
                    expected,
                    actual: child.index,
                });
            }
            let parent_hash = parent.hash();
            if child.prev_hash != parent_hash {
                return Err(LedgerError::HashMismatch {
                    expected: parent_hash,
                    actual: child.prev_hash,
                });
            }
        }
        Ok(())
    }
}
