//! # Shared Crypto
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 | Transaction and consensus message signing |
//! | `hashing` | Keccak-256 | Transaction, block and message digests |
//! | `keystore` | SEC1 / SPKI PEM | Key persistence for nodes and clients |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S signatures
//! - **Verification** never panics; callers get a `bool` or a typed error

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod keystore;

// Re-exports
pub use ecdsa::{sign, verify, Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use errors::{CryptoError, KeyStoreError};
pub use hashing::{keccak256, keccak256_many, Hash, Keccak256Hasher};
pub use keystore::KeyStore;
