//! # Ledger Adapter
//!
//! Implements the consensus `LedgerPort` over the node's exclusive ledger
//! and evicts committed transactions from the shared pool.

use parking_lot::Mutex;
use ql_01_ledger::{Block, Ledger, LedgerError};
use ql_02_mempool::TransactionPool;
use ql_03_consensus::{LedgerPort, LedgerTail};
use shared_types::{short_hex, Hash, NodeId};
use std::sync::Arc;
use tracing::debug;

pub struct SharedLedger {
    node: NodeId,
    ledger: Mutex<Ledger>,
    pool: Arc<Mutex<TransactionPool>>,
}

impl SharedLedger {
    pub fn new(node: NodeId, ledger: Ledger, pool: Arc<Mutex<TransactionPool>>) -> Self {
        Self {
            node,
            ledger: Mutex::new(ledger),
            pool,
        }
    }

    pub fn height(&self) -> u64 {
        self.ledger.lock().height()
    }

    pub fn snapshot(&self) -> Ledger {
        self.ledger.lock().clone()
    }

    /// Run `f` against the ledger under its lock.
    pub fn with<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.ledger.lock())
    }
}

impl LedgerPort for SharedLedger {
    fn tail(&self) -> LedgerTail {
        let ledger = self.ledger.lock();
        LedgerTail {
            index: ledger.height(),
            hash: ledger.tail_hash(),
        }
    }

    fn append(&self, block: Block) -> Result<(), LedgerError> {
        let committed: Vec<Hash> = block.transaction_hashes().collect();
        let block_hash = block.hash();
        self.ledger.lock().append(block)?;

        let removed = self.pool.lock().remove_committed(&committed);
        debug!(
            node = %self.node,
            block = %short_hex(&block_hash),
            transactions = committed.len(),
            removed,
            "Removed committed transactions from pool"
        );
        Ok(())
    }

    fn contains_transaction(&self, hash: &Hash) -> bool {
        self.ledger.lock().contains_transaction(hash)
    }
}
