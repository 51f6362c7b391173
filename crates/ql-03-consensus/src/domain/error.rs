//! Error types for the consensus engine

use ql_01_ledger::LedgerError;
use shared_types::NodeId;

/// Consensus error types
///
/// None of these terminate a node. Handlers log them and drop the
/// offending message; byzantine evidence additionally triggers a
/// view-change vote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Invalid {kind} signature from {replica}")]
    InvalidSignature { kind: &'static str, replica: NodeId },

    #[error("Stale message for view {view}, sequence {sequence}")]
    StaleMessage { view: u64, sequence: u64 },

    #[error("Sequence {sequence} outside window ending at {high}")]
    OutOfWindow { sequence: u64, high: u64 },

    #[error("Unknown replica: {0}")]
    UnknownReplica(NodeId),

    #[error("Not primary for view {view}: expected {expected}, got {actual}")]
    NotPrimary {
        view: u64,
        expected: NodeId,
        actual: NodeId,
    },

    #[error("View change in progress from view {view}")]
    ViewChangeInProgress { view: u64 },

    #[error("PrePrepare digest does not match block at view {view}, sequence {sequence}")]
    DigestMismatch { view: u64, sequence: u64 },

    #[error("Conflicting PrePrepare at view {view}, sequence {sequence}")]
    Equivocation { view: u64, sequence: u64 },

    #[error("Invalid proposal at sequence {sequence}: {reason}")]
    InvalidProposal { sequence: u64, reason: String },

    #[error("Invalid prepared proof from {replica} at sequence {sequence}")]
    InvalidProof { replica: NodeId, sequence: u64 },

    #[error("Proposal already in flight at sequence {0}")]
    ProposalInFlight(u64),

    #[error("No valid transactions to propose")]
    EmptyBatch,

    #[error("No quorum before timeout in view {view}")]
    QuorumTimeout { view: u64 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Validator set is empty")]
    EmptyValidatorSet,
}

impl ConsensusError {
    /// `true` when the error is evidence against the current primary.
    pub fn implicates_primary(&self) -> bool {
        matches!(
            self,
            Self::DigestMismatch { .. } | Self::Equivocation { .. } | Self::InvalidProposal { .. }
        )
    }

    /// Short label used for the rejected-messages metric.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::StaleMessage { .. } => "stale",
            Self::OutOfWindow { .. } => "out_of_window",
            Self::UnknownReplica(_) => "unknown_replica",
            Self::NotPrimary { .. } => "not_primary",
            Self::ViewChangeInProgress { .. } => "view_change_in_progress",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::Equivocation { .. } => "equivocation",
            Self::InvalidProposal { .. } => "invalid_proposal",
            Self::InvalidProof { .. } => "invalid_proof",
            Self::ProposalInFlight(_) => "proposal_in_flight",
            Self::EmptyBatch => "empty_batch",
            Self::QuorumTimeout { .. } => "quorum_timeout",
            Self::Ledger(_) => "ledger",
            Self::EmptyValidatorSet => "empty_validator_set",
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
