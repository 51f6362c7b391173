//! Consensus configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consensus engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Time allowed for a round to commit before a view change (ms)
    pub view_change_timeout_ms: u64,
    /// Maximum transactions per proposed block
    pub max_batch_size: usize,
    /// Broadcast a checkpoint every this many blocks
    pub checkpoint_interval: u64,
    /// Maximum buffered messages for future views
    pub future_buffer_limit: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            view_change_timeout_ms: 2_000,
            max_batch_size: 100,
            checkpoint_interval: 10,
            future_buffer_limit: 1_024,
        }
    }
}

impl ConsensusConfig {
    pub fn view_change_timeout(&self) -> Duration {
        Duration::from_millis(self.view_change_timeout_ms)
    }

    /// Highest sequence accepted beyond the ledger tail.
    pub fn sequence_window(&self) -> u64 {
        self.checkpoint_interval.max(1) * 2
    }
}
