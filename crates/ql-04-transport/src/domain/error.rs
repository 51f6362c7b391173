//! Transport and codec errors.

use thiserror::Error;

/// Failure to decode or encode a wire payload. The payload is dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Empty payload")]
    Empty,

    #[error("Unknown payload tag in {0:?}")]
    UnknownTag(String),

    #[error("Malformed {tag} body: {source}")]
    Json {
        tag: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Address {0} already has a listener")]
    AddressInUse(String),

    #[error("Payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl TransportError {
    pub(crate) fn unreachable(address: &str, reason: impl ToString) -> Self {
        Self::Unreachable {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}
