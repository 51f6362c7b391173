//! # Quorum-Ledger Test Suite
//!
//! Cross-crate scenarios run against whole clusters.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Cluster fixtures and polling helpers
//! └── scenarios/
//!     ├── e2e.rs         # Happy path on the memory transport
//!     ├── byzantine.rs   # Faulty and silent primaries
//!     ├── checkpoints.rs # Stable checkpoints and log garbage collection
//!     └── tcp.rs         # Four nodes over localhost TCP
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ql-tests
//! cargo test -p ql-tests scenarios::byzantine::
//! ```

#![allow(dead_code)]

pub mod scenarios;
pub mod support;
