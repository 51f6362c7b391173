//! Hash-linked blocks.

use super::certificate::QuorumCertificate;
use super::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::Keccak256Hasher;
use shared_types::{Hash, NodeId};

/// A block of ordered transactions.
///
/// The hash covers the header fields and the ordered transaction hashes but
/// not the certificate, so attaching the certificate after commit leaves
/// the hash unchanged.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    #[serde_as(as = "Hex")]
    pub prev_hash: Hash,
    pub transactions: Vec<Transaction>,
    /// Creation time, unix milliseconds.
    pub timestamp: u64,
    pub proposer: NodeId,
    pub certificate: QuorumCertificate,
}

impl Block {
    /// New uncertified block.
    pub fn new(
        index: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        timestamp: u64,
        proposer: NodeId,
    ) -> Self {
        Self {
            index,
            prev_hash,
            transactions,
            timestamp,
            proposer,
            certificate: QuorumCertificate::empty(),
        }
    }

    /// Compute block hash (Keccak-256 of the header and transaction hashes).
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(b"QL-BLOCK")
            .update(&self.index.to_le_bytes())
            .update(&self.prev_hash)
            .update(&self.timestamp.to_le_bytes())
            .update_field(self.proposer.as_str().as_bytes())
            .update(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            hasher.update(&tx.hash);
        }
        hasher.finalize()
    }

    /// Attach the commit certificate.
    pub fn with_certificate(mut self, certificate: QuorumCertificate) -> Self {
        self.certificate = certificate;
        self
    }

    pub fn transaction_hashes(&self) -> impl Iterator<Item = Hash> + '_ {
        self.transactions.iter().map(|tx| tx.hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
