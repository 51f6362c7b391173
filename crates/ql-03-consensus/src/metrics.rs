//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring consensus progress.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! ql-03-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_blocks_committed_total` - Counter of blocks appended after commit
//! - `consensus_view_changes_total` - Counter of views entered after a view change
//! - `consensus_messages_rejected_total` - Counter of dropped messages (by reason)
//! - `consensus_current_view` - Gauge of the local view

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total blocks appended after a commit quorum
    pub static ref BLOCKS_COMMITTED: IntCounter = register_int_counter!(
        "consensus_blocks_committed_total",
        "Total number of blocks appended after a commit quorum"
    )
    .expect("Failed to create BLOCKS_COMMITTED metric");

    /// Total view changes completed
    pub static ref VIEW_CHANGES: IntCounter = register_int_counter!(
        "consensus_view_changes_total",
        "Total number of views entered through a view change"
    )
    .expect("Failed to create VIEW_CHANGES metric");

    /// Total messages rejected, labeled by reason
    pub static ref MESSAGES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "consensus_messages_rejected_total",
        "Total number of consensus messages rejected",
        &["reason"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");

    /// Current view
    pub static ref CURRENT_VIEW: IntGauge = register_int_gauge!(
        "consensus_current_view",
        "Current consensus view"
    )
    .expect("Failed to create CURRENT_VIEW metric");
}

/// Record a block appended after commit
#[cfg(feature = "metrics")]
pub fn record_block_committed() {
    BLOCKS_COMMITTED.inc();
}

/// Record entering `view` through a view change
#[cfg(feature = "metrics")]
pub fn record_view_change(view: u64) {
    VIEW_CHANGES.inc();
    CURRENT_VIEW.set(view as i64);
}

/// Record a rejected message with reason
#[cfg(feature = "metrics")]
pub fn record_message_rejected(reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[reason]).inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_block_committed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_view_change(_view: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_reason: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_callable() {
        record_block_committed();
        record_view_change(1);
        record_message_rejected("test");
    }
}
