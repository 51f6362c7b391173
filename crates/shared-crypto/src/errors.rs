//! Crypto error types.

use std::path::PathBuf;
use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// PEM encoding or decoding failed
    #[error("PEM error: {0}")]
    Pem(String),
}

/// Key store errors.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// Reading or writing a key file failed
    #[error("Key file {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A key file could not be decoded
    #[error("Malformed key file {path}: {reason}")]
    Malformed {
        /// File that failed
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Private and public key files belong to different keys
    #[error("Key pair mismatch for {owner}")]
    Mismatch {
        /// Key owner
        owner: String,
    },

    /// Encoding failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
