//! # Error Types
//!
//! Errors raised while building shared directory values.

use thiserror::Error;

/// Errors building or querying a `NodeTable`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The table has no members.
    #[error("NodeTable is empty")]
    Empty,

    /// An address is not in `host:port` form.
    #[error("Invalid address for {node}: {address}")]
    InvalidAddress { node: String, address: String },

    /// Two nodes share the same address.
    #[error("Duplicate address {address} for {first} and {second}")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },

    /// The referenced node is not a member.
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}
