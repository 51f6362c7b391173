//! # ql-03-consensus
//!
//! PBFT consensus engine for Quorum-Ledger.
//!
//! ## Architecture
//!
//! A cluster of `N` validators tolerates `f = (N-1)/3` byzantine replicas.
//! Every block passes three phases before it reaches the ledger:
//!
//! ```text
//! primary ──PrePrepare──→ replicas
//! all     ──Prepare────→ all      (2f+1 matching → Prepared)
//! all     ──Commit─────→ all      (2f+1 matching → Committed → append)
//! ```
//!
//! A round that does not commit before `view_change_timeout` makes replicas
//! vote for the next view; `2f+1` votes rotate the primary. Every
//! `checkpoint_interval` blocks a stable checkpoint garbage-collects the log.
//!
//! ## Ports
//!
//! - [`ports::Broadcaster`] delivers messages to the other replicas
//! - [`ports::LedgerPort`] exposes the node's ledger tail and append
//! - [`ports::ConsensusApi`] is what the node runtime drives
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ql_03_consensus::{ConsensusDependencies, ConsensusService};
//!
//! let service = ConsensusService::new(ConsensusDependencies {
//!     broadcaster,
//!     ledger,
//!     validators,
//!     node_id,
//!     keypair,
//!     config: ConsensusConfig::default(),
//! })?;
//!
//! service.handle_message(message).await?;
//! ```

pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;
mod state;

pub use domain::{
    Checkpoint, Commit, ConsensusConfig, ConsensusError, ConsensusMessage, ConsensusResult,
    EntryStatus, PrePrepare, Prepare, PreparedProof, ValidatorSet, ViewChange,
};
pub use ports::{Broadcaster, ConsensusApi, ConsensusStatus, LedgerPort, LedgerTail};
pub use service::{ConsensusDependencies, ConsensusService};
