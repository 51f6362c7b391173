//! Quorum certificates attached to committed blocks.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{Hash, NodeId};
use std::collections::{HashMap, HashSet};

/// Create signing message for a Commit vote.
///
/// Format: "COMMIT" || view (8 bytes LE) || sequence (8 bytes LE) || digest (32 bytes)
pub fn commit_signing_message(view: u64, sequence: u64, digest: &Hash) -> Vec<u8> {
    let mut msg = Vec::with_capacity(6 + 8 + 8 + 32);
    msg.extend_from_slice(b"COMMIT");
    msg.extend_from_slice(&view.to_le_bytes());
    msg.extend_from_slice(&sequence.to_le_bytes());
    msg.extend_from_slice(digest);
    msg
}

/// One replica's Commit signature inside a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateVote {
    pub replica: NodeId,
    pub signature: Secp256k1Signature,
}

/// Commit votes that finalized a block at `(view, sequence)`.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub view: u64,
    pub sequence: u64,
    #[serde_as(as = "Hex")]
    pub digest: Hash,
    pub votes: Vec<CertificateVote>,
}

impl QuorumCertificate {
    /// The certificate carried by genesis and by blocks still in flight.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Count distinct validators whose signature over this certificate's
    /// commit payload verifies.
    pub fn valid_votes(&self, validators: &HashMap<NodeId, Secp256k1PublicKey>) -> usize {
        let message = commit_signing_message(self.view, self.sequence, &self.digest);
        let mut seen = HashSet::new();
        self.votes
            .iter()
            .filter(|vote| {
                validators.get(&vote.replica).is_some_and(|key| {
                    shared_crypto::verify(key, &message, &vote.signature)
                }) && seen.insert(vote.replica.clone())
            })
            .count()
    }

    /// `true` iff the certificate covers `digest` with at least `quorum`
    /// distinct valid votes.
    pub fn verify(
        &self,
        digest: &Hash,
        quorum: usize,
        validators: &HashMap<NodeId, Secp256k1PublicKey>,
    ) -> bool {
        &self.digest == digest && self.valid_votes(validators) >= quorum
    }
}
