//! # ql-01-ledger
//!
//! Replicated ledger for Quorum-Ledger: signed transactions, hash-linked
//! blocks carrying quorum certificates, and the append-only chain itself.
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Hash Linkage | `blocks[i].prev_hash == blocks[i-1].hash()` |
//! | Contiguous Heights | `blocks[i].index == i` |
//! | Append Only | Blocks are never reordered or truncated |
//! | Atomic Append | A rejected block leaves the ledger unchanged |
//!
//! ## Usage
//!
//! ```ignore
//! use ql_01_ledger::{Block, Ledger, Transaction};
//!
//! let mut ledger = Ledger::with_genesis(&NodeId::new("Node1"));
//! let tx = Transaction::create("0xA".into(), "0xB".into(), 10.0, 0.5, &keypair)?;
//! let block = Block::new(1, ledger.tail_hash(), vec![tx], now_millis(), proposer);
//! ledger.append(block)?;
//! ```

pub mod domain;
pub mod export;

pub use domain::*;
pub use export::{ExportError, LedgerExport};
