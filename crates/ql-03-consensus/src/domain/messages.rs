//! Signed PBFT protocol messages.
//!
//! Every message carries the sender's signature over a domain-tagged,
//! fixed-layout signing payload. Signatures are checked against the
//! `ValidatorSet` before a message touches any state.

use ql_01_ledger::Block;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{Hash, NodeId};

pub use ql_01_ledger::commit_signing_message;

/// Create signing message for a PrePrepare.
///
/// Format: "PREPREPARE" || view (8 bytes LE) || sequence (8 bytes LE) || digest (32 bytes)
pub fn pre_prepare_signing_message(view: u64, sequence: u64, digest: &Hash) -> Vec<u8> {
    phase_message(b"PREPREPARE", view, sequence, digest)
}

/// Create signing message for a Prepare.
///
/// Format: "PREPARE" || view (8 bytes LE) || sequence (8 bytes LE) || digest (32 bytes)
pub fn prepare_signing_message(view: u64, sequence: u64, digest: &Hash) -> Vec<u8> {
    phase_message(b"PREPARE", view, sequence, digest)
}

/// Create signing message for a Checkpoint.
///
/// Format: "CHECKPOINT" || sequence (8 bytes LE) || block hash (32 bytes)
pub fn checkpoint_signing_message(sequence: u64, block_hash: &Hash) -> Vec<u8> {
    let mut msg = Vec::with_capacity(10 + 8 + 32);
    msg.extend_from_slice(b"CHECKPOINT");
    msg.extend_from_slice(&sequence.to_le_bytes());
    msg.extend_from_slice(block_hash);
    msg
}

/// Create signing message for a ViewChange.
///
/// Format: "VIEWCHANGE" || new view || last sequence || replica (len-prefixed)
/// || count || (view, sequence, digest) per prepared proof
pub fn view_change_signing_message(
    new_view: u64,
    replica: &NodeId,
    last_sequence: u64,
    prepared: &[PreparedProof],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(64 + prepared.len() * 48);
    msg.extend_from_slice(b"VIEWCHANGE");
    msg.extend_from_slice(&new_view.to_le_bytes());
    msg.extend_from_slice(&last_sequence.to_le_bytes());
    msg.extend_from_slice(&(replica.as_str().len() as u32).to_le_bytes());
    msg.extend_from_slice(replica.as_str().as_bytes());
    msg.extend_from_slice(&(prepared.len() as u32).to_le_bytes());
    for proof in prepared {
        msg.extend_from_slice(&proof.view.to_le_bytes());
        msg.extend_from_slice(&proof.sequence.to_le_bytes());
        msg.extend_from_slice(&proof.digest);
    }
    msg
}

fn phase_message(tag: &[u8], view: u64, sequence: u64, digest: &Hash) -> Vec<u8> {
    let mut msg = Vec::with_capacity(tag.len() + 8 + 8 + 32);
    msg.extend_from_slice(tag);
    msg.extend_from_slice(&view.to_le_bytes());
    msg.extend_from_slice(&sequence.to_le_bytes());
    msg.extend_from_slice(digest);
    msg
}

/// Primary's proposal of `block` at `(view, sequence)`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepare {
    pub view: u64,
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub digest: Hash,
    pub block: Block,
    pub primary: NodeId,
    pub signature: Secp256k1Signature,
}

impl PrePrepare {
    /// Sign a proposal; the digest is the block hash.
    pub fn new(view: u64, block: Block, primary: NodeId, keypair: &Secp256k1KeyPair) -> Self {
        let sequence = block.index;
        let digest = block.hash();
        let signature = keypair.sign(&pre_prepare_signing_message(view, sequence, &digest));
        Self {
            view,
            sequence,
            digest,
            block,
            primary,
            signature,
        }
    }

    pub fn signing_message(&self) -> Vec<u8> {
        pre_prepare_signing_message(self.view, self.sequence, &self.digest)
    }

    pub fn verify_signature(&self, key: &Secp256k1PublicKey) -> bool {
        shared_crypto::verify(key, &self.signing_message(), &self.signature)
    }
}

/// A replica's vote that it accepted the PrePrepare for `digest`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    pub view: u64,
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub digest: Hash,
    pub replica: NodeId,
    pub signature: Secp256k1Signature,
}

impl Prepare {
    pub fn new(
        view: u64,
        sequence: u64,
        digest: Hash,
        replica: NodeId,
        keypair: &Secp256k1KeyPair,
    ) -> Self {
        let signature = keypair.sign(&prepare_signing_message(view, sequence, &digest));
        Self {
            view,
            sequence,
            digest,
            replica,
            signature,
        }
    }

    pub fn signing_message(&self) -> Vec<u8> {
        prepare_signing_message(self.view, self.sequence, &self.digest)
    }

    pub fn verify_signature(&self, key: &Secp256k1PublicKey) -> bool {
        shared_crypto::verify(key, &self.signing_message(), &self.signature)
    }
}

/// A replica's vote that it saw a prepare quorum for `digest`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub view: u64,
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub digest: Hash,
    pub replica: NodeId,
    pub signature: Secp256k1Signature,
}

impl Commit {
    pub fn new(
        view: u64,
        sequence: u64,
        digest: Hash,
        replica: NodeId,
        keypair: &Secp256k1KeyPair,
    ) -> Self {
        let signature = keypair.sign(&commit_signing_message(view, sequence, &digest));
        Self {
            view,
            sequence,
            digest,
            replica,
            signature,
        }
    }

    pub fn signing_message(&self) -> Vec<u8> {
        commit_signing_message(self.view, self.sequence, &self.digest)
    }

    pub fn verify_signature(&self, key: &Secp256k1PublicKey) -> bool {
        shared_crypto::verify(key, &self.signing_message(), &self.signature)
    }
}

/// Evidence that `block` was prepared at `(view, sequence)`: the block and
/// the quorum of Prepares that prepared it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedProof {
    pub view: u64,
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub digest: Hash,
    pub block: Block,
    pub prepares: Vec<Prepare>,
}

/// Vote to move to `new_view`, carrying every prepared entry the replica
/// has not yet appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChange {
    pub new_view: u64,
    pub replica: NodeId,
    /// Index of the replica's ledger tail.
    pub last_sequence: u64,
    pub prepared: Vec<PreparedProof>,
    pub signature: Secp256k1Signature,
}

impl ViewChange {
    pub fn new(
        new_view: u64,
        replica: NodeId,
        last_sequence: u64,
        prepared: Vec<PreparedProof>,
        keypair: &Secp256k1KeyPair,
    ) -> Self {
        let signature = keypair.sign(&view_change_signing_message(
            new_view,
            &replica,
            last_sequence,
            &prepared,
        ));
        Self {
            new_view,
            replica,
            last_sequence,
            prepared,
            signature,
        }
    }

    pub fn signing_message(&self) -> Vec<u8> {
        view_change_signing_message(
            self.new_view,
            &self.replica,
            self.last_sequence,
            &self.prepared,
        )
    }

    pub fn verify_signature(&self, key: &Secp256k1PublicKey) -> bool {
        shared_crypto::verify(key, &self.signing_message(), &self.signature)
    }
}

/// Announcement that the replica appended `block_hash` at `sequence`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub block_hash: Hash,
    pub replica: NodeId,
    pub signature: Secp256k1Signature,
}

impl Checkpoint {
    pub fn new(
        sequence: u64,
        block_hash: Hash,
        replica: NodeId,
        keypair: &Secp256k1KeyPair,
    ) -> Self {
        let signature = keypair.sign(&checkpoint_signing_message(sequence, &block_hash));
        Self {
            sequence,
            block_hash,
            replica,
            signature,
        }
    }

    pub fn verify_signature(&self, key: &Secp256k1PublicKey) -> bool {
        shared_crypto::verify(
            key,
            &checkpoint_signing_message(self.sequence, &self.block_hash),
            &self.signature,
        )
    }
}

/// Any consensus-phase message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    PrePrepare(PrePrepare),
    Prepare(Prepare),
    Commit(Commit),
    ViewChange(ViewChange),
    Checkpoint(Checkpoint),
}

impl ConsensusMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrePrepare(_) => "preprepare",
            Self::Prepare(_) => "prepare",
            Self::Commit(_) => "commit",
            Self::ViewChange(_) => "viewchange",
            Self::Checkpoint(_) => "checkpoint",
        }
    }

    pub fn sender(&self) -> &NodeId {
        match self {
            Self::PrePrepare(m) => &m.primary,
            Self::Prepare(m) => &m.replica,
            Self::Commit(m) => &m.replica,
            Self::ViewChange(m) => &m.replica,
            Self::Checkpoint(m) => &m.replica,
        }
    }

    /// View of a three-phase message; `None` for view changes and checkpoints.
    pub fn phase_view(&self) -> Option<u64> {
        match self {
            Self::PrePrepare(m) => Some(m.view),
            Self::Prepare(m) => Some(m.view),
            Self::Commit(m) => Some(m.view),
            Self::ViewChange(_) | Self::Checkpoint(_) => None,
        }
    }
}
