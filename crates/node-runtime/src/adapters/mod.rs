//! Port implementations wiring the core crates together.

pub mod ledger;

pub use ledger::SharedLedger;
