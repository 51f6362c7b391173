//! # Core Identifiers
//!
//! - **Hashing**: `Hash`, the zero sentinel and hex rendering
//! - **Identity**: `NodeId` for replicas, `Address` for client accounts
//! - **Time**: millisecond wall-clock timestamps

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// The previous-hash sentinel carried by the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Render a hash as lowercase hex.
pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Short hex prefix used in log lines.
pub fn short_hex(hash: &Hash) -> String {
    hash_hex(hash)[..12].to_string()
}

/// Logical identifier of a node in the NodeTable (e.g. `Node1`).
///
/// Ordering is lexicographic and defines the round-robin primary rotation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Client account address (e.g. `0x145287`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
