//! Driving ports (Inbound API)

use crate::domain::{ConsensusMessage, ConsensusResult};
use async_trait::async_trait;
use ql_01_ledger::Transaction;
use shared_types::NodeId;

/// Snapshot of engine state for logging, tests and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusStatus {
    pub view: u64,
    pub primary: NodeId,
    pub view_changing: bool,
    pub last_appended: u64,
    pub stable_checkpoint: u64,
    pub log_entries: usize,
}

/// Primary Consensus API
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    /// Propose a block of `transactions` (primary only).
    ///
    /// Returns the proposed sequence.
    async fn propose(&self, transactions: Vec<Transaction>) -> ConsensusResult<u64>;

    /// Route one inbound consensus message to its phase handler.
    async fn handle_message(&self, message: ConsensusMessage) -> ConsensusResult<()>;

    /// Drive the view-change timer.
    async fn tick(&self);

    /// Start the round timer if idle; a silent primary is then replaced.
    fn note_pending_work(&self);

    fn is_primary(&self) -> bool;

    fn current_view(&self) -> u64;

    fn status(&self) -> ConsensusStatus;
}
