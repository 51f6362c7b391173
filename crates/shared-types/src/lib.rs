//! # Shared Types Crate
//!
//! Identifiers used across every Quorum-Ledger crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: hashes, node ids and client addresses are
//!   defined once here.
//! - **Explicit Directory**: the `NodeTable` is a value passed into each node,
//!   never a process-wide global.

pub mod entities;
pub mod errors;
pub mod node_table;

pub use entities::*;
pub use errors::*;
pub use node_table::NodeTable;
