//! Consensus log entries.
//!
//! One entry per `(view, sequence)`. Votes are stored per replica, so the
//! quorum decision is the same whatever order the votes arrive in.

use super::messages::{Commit, PrePrepare, Prepare, PreparedProof};
use ql_01_ledger::{Block, CertificateVote, QuorumCertificate};
use shared_types::{Hash, NodeId};
use std::collections::HashMap;

/// `(view, sequence)`
pub type EntryKey = (u64, u64);

/// Phase reached by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryStatus {
    /// Votes may have arrived but no PrePrepare was accepted yet.
    Idle,
    PrePrepared,
    Prepared,
    Committed,
}

/// Result of offering a PrePrepare to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrePrepareOutcome {
    Accepted,
    /// Same digest already accepted.
    Duplicate,
    /// A different digest was already accepted: the primary equivocated.
    Conflict,
}

/// What an entry reached after `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    None,
    /// Prepare quorum reached; the local Commit should be sent.
    Prepared,
    /// Commit quorum reached; the certified block is ready to append.
    Committed(Block),
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub view: u64,
    pub sequence: u64,
    pub status: EntryStatus,
    pub pre_prepare: Option<PrePrepare>,
    pub prepares: HashMap<NodeId, Prepare>,
    pub commits: HashMap<NodeId, Commit>,
}

impl LogEntry {
    pub fn new(view: u64, sequence: u64) -> Self {
        Self {
            view,
            sequence,
            status: EntryStatus::Idle,
            pre_prepare: None,
            prepares: HashMap::new(),
            commits: HashMap::new(),
        }
    }

    /// Digest of the accepted PrePrepare.
    pub fn digest(&self) -> Option<Hash> {
        self.pre_prepare.as_ref().map(|pp| pp.digest)
    }

    pub fn accept_pre_prepare(&mut self, pre_prepare: PrePrepare) -> PrePrepareOutcome {
        match &self.pre_prepare {
            Some(existing) if existing.digest == pre_prepare.digest => PrePrepareOutcome::Duplicate,
            Some(_) => PrePrepareOutcome::Conflict,
            None => {
                self.pre_prepare = Some(pre_prepare);
                self.status = EntryStatus::PrePrepared;
                PrePrepareOutcome::Accepted
            }
        }
    }

    /// Record a Prepare. The first vote per replica wins.
    pub fn add_prepare(&mut self, prepare: Prepare) -> bool {
        if self.prepares.contains_key(&prepare.replica) {
            return false;
        }
        self.prepares.insert(prepare.replica.clone(), prepare);
        true
    }

    /// Record a Commit. The first vote per replica wins.
    pub fn add_commit(&mut self, commit: Commit) -> bool {
        if self.commits.contains_key(&commit.replica) {
            return false;
        }
        self.commits.insert(commit.replica.clone(), commit);
        true
    }

    pub fn matching_prepares(&self) -> usize {
        match self.digest() {
            Some(digest) => self.prepares.values().filter(|p| p.digest == digest).count(),
            None => 0,
        }
    }

    pub fn matching_commits(&self) -> usize {
        match self.digest() {
            Some(digest) => self.commits.values().filter(|c| c.digest == digest).count(),
            None => 0,
        }
    }

    /// Move forward by at most one phase given `quorum`.
    pub fn advance(&mut self, quorum: usize) -> Progress {
        match self.status {
            EntryStatus::PrePrepared if self.matching_prepares() >= quorum => {
                self.status = EntryStatus::Prepared;
                Progress::Prepared
            }
            EntryStatus::Prepared if self.matching_commits() >= quorum => {
                self.status = EntryStatus::Committed;
                match self.certified_block() {
                    Some(block) => Progress::Committed(block),
                    None => Progress::None,
                }
            }
            _ => Progress::None,
        }
    }

    /// The proposed block with a certificate of every matching Commit.
    fn certified_block(&self) -> Option<Block> {
        let pre_prepare = self.pre_prepare.as_ref()?;
        let mut votes: Vec<CertificateVote> = self
            .commits
            .values()
            .filter(|c| c.digest == pre_prepare.digest)
            .map(|c| CertificateVote {
                replica: c.replica.clone(),
                signature: c.signature,
            })
            .collect();
        votes.sort_by(|a, b| a.replica.cmp(&b.replica));

        let certificate = QuorumCertificate {
            view: self.view,
            sequence: self.sequence,
            digest: pre_prepare.digest,
            votes,
        };
        Some(pre_prepare.block.clone().with_certificate(certificate))
    }

    /// Prepared-proof for view changes, when the entry reached Prepared.
    pub fn prepared_proof(&self) -> Option<PreparedProof> {
        if self.status < EntryStatus::Prepared {
            return None;
        }
        let pre_prepare = self.pre_prepare.as_ref()?;
        let mut prepares: Vec<Prepare> = self
            .prepares
            .values()
            .filter(|p| p.digest == pre_prepare.digest)
            .cloned()
            .collect();
        prepares.sort_by(|a, b| a.replica.cmp(&b.replica));
        Some(PreparedProof {
            view: self.view,
            sequence: self.sequence,
            digest: pre_prepare.digest,
            block: pre_prepare.block.clone(),
            prepares,
        })
    }

    /// Accepted a PrePrepare but not yet committed.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, EntryStatus::PrePrepared | EntryStatus::Prepared)
    }
}
