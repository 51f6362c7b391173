//! Checkpoint vote tracking.

use shared_types::{Hash, NodeId};
use std::collections::{BTreeMap, HashMap};

/// Collects Checkpoint votes until `quorum` replicas agree on a block hash.
#[derive(Debug, Default)]
pub struct CheckpointTracker {
    votes: BTreeMap<u64, HashMap<NodeId, Hash>>,
    stable: Option<(u64, Hash)>,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of the latest stable checkpoint (0 if none).
    pub fn stable_sequence(&self) -> u64 {
        self.stable.map(|(sequence, _)| sequence).unwrap_or(0)
    }

    pub fn stable(&self) -> Option<(u64, Hash)> {
        self.stable
    }

    /// Record a vote. Returns the checkpoint if this vote made it stable.
    ///
    /// Votes at or below the stable sequence are ignored. Becoming stable
    /// discards every vote at or below the new stable sequence.
    pub fn record(
        &mut self,
        sequence: u64,
        replica: NodeId,
        block_hash: Hash,
        quorum: usize,
    ) -> Option<(u64, Hash)> {
        if sequence <= self.stable_sequence() {
            return None;
        }
        let votes = self.votes.entry(sequence).or_default();
        votes.entry(replica).or_insert(block_hash);

        let matching = votes.values().filter(|h| **h == block_hash).count();
        if matching < quorum {
            return None;
        }

        self.stable = Some((sequence, block_hash));
        self.votes = self.votes.split_off(&(sequence + 1));
        self.stable
    }

    /// Sequences with outstanding votes.
    pub fn pending(&self) -> usize {
        self.votes.len()
    }
}
