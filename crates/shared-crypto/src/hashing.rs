//! # Keccak-256 Hashing
//!
//! Digests for transactions, blocks and consensus signing payloads.

use sha3::{Digest, Keccak256};

/// Keccak-256 hash output (256-bit).
pub type Hash = [u8; 32];

/// Stateful Keccak-256 hasher.
#[derive(Clone, Default)]
pub struct Keccak256Hasher {
    inner: Keccak256,
}

impl Keccak256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Update with a length-prefixed field so adjacent fields cannot alias.
    pub fn update_field(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update((data.len() as u32).to_le_bytes());
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}

/// Hash data with Keccak-256 (one-shot).
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Hash multiple inputs as one concatenated stream.
pub fn keccak256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}
