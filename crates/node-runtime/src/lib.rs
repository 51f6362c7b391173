//! # Node Runtime Library
//!
//! Composes the core crates into a running replica and exposes the pieces
//! the `quorum-node` binary and the integration tests build on.
//!
//! ## Modules
//!
//! - `config` - TOML node configuration with `QL_*` environment overrides
//! - `telemetry` - `tracing` subscriber setup
//! - `adapters` - `LedgerPort` over the node's ledger and mempool
//! - `node` - `Node` composition, payload routing and the ticker
//! - `client` - simulated wallets broadcasting signed transfers
//! - `cluster` - in-process clusters over the memory transport

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod client;
pub mod cluster;
pub mod config;
pub mod node;
pub mod telemetry;

pub use client::{ClientReport, SimulatedClient};
pub use cluster::LocalCluster;
pub use config::{ConfigError, LoggingConfig, NodeConfig};
pub use node::{Node, NodeDependencies, NodeError, NodeSettings};
pub use telemetry::{init_logging, TelemetryError};
