//! Validator domain entities

use super::error::{ConsensusError, ConsensusResult};
use shared_crypto::Secp256k1PublicKey;
use shared_types::NodeId;
use std::collections::HashMap;

/// The fixed set of replicas and their signing keys.
///
/// Members are kept in `NodeId` order; that order defines the round-robin
/// primary rotation.
#[derive(Clone, Debug)]
pub struct ValidatorSet {
    order: Vec<NodeId>,
    keys: HashMap<NodeId, Secp256k1PublicKey>,
}

impl ValidatorSet {
    /// Create a validator set from `(id, key)` pairs.
    pub fn new(
        members: impl IntoIterator<Item = (NodeId, Secp256k1PublicKey)>,
    ) -> ConsensusResult<Self> {
        let keys: HashMap<_, _> = members.into_iter().collect();
        if keys.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        let mut order: Vec<_> = keys.keys().cloned().collect();
        order.sort();
        Ok(Self { order, keys })
    }

    /// Get the number of validators
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check if a validator is in the set
    pub fn contains(&self, id: &NodeId) -> bool {
        self.keys.contains_key(id)
    }

    /// Get validator's public key
    pub fn public_key(&self, id: &NodeId) -> Option<&Secp256k1PublicKey> {
        self.keys.get(id)
    }

    /// Like `public_key`, as a consensus error.
    pub fn require(&self, id: &NodeId) -> ConsensusResult<&Secp256k1PublicKey> {
        self.keys
            .get(id)
            .ok_or_else(|| ConsensusError::UnknownReplica(id.clone()))
    }

    /// Maximum tolerated faulty replicas: `f = (N - 1) / 3`.
    pub fn fault_tolerance(&self) -> usize {
        (self.len().saturating_sub(1)) / 3
    }

    /// Calculate required votes for PBFT (2f+1)
    pub fn quorum(&self) -> usize {
        2 * self.fault_tolerance() + 1
    }

    /// Votes that guarantee at least one correct replica (f+1).
    pub fn weak_quorum(&self) -> usize {
        self.fault_tolerance() + 1
    }

    /// Primary of `view`: member `view mod N` in id order.
    pub fn primary(&self, view: u64) -> &NodeId {
        let index = (view % self.order.len() as u64) as usize;
        &self.order[index]
    }

    /// Validator ids in rotation order.
    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    /// `id -> key` map, as used to verify quorum certificates.
    pub fn directory(&self) -> &HashMap<NodeId, Secp256k1PublicKey> {
        &self.keys
    }
}
