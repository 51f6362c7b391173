//! Driven ports (Outbound dependencies)

use crate::domain::ConsensusMessage;
use async_trait::async_trait;
use ql_01_ledger::{Block, LedgerError};
use shared_types::Hash;

/// Delivery of consensus messages to every other replica.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Send `message` to all replicas except the local one.
    ///
    /// Per-peer failures are the adapter's to log; an `Err` means nothing
    /// could be sent at all.
    async fn broadcast(&self, message: ConsensusMessage) -> Result<(), String>;
}

/// Tail of the local ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTail {
    pub index: u64,
    pub hash: Hash,
}

/// The node's ledger as seen by consensus.
///
/// Implementations serialize `append` under an exclusive lock.
pub trait LedgerPort: Send + Sync {
    fn tail(&self) -> LedgerTail;

    fn append(&self, block: Block) -> Result<(), LedgerError>;

    /// Whether a transaction with this hash is already on the ledger.
    fn contains_transaction(&self, hash: &Hash) -> bool;
}
