//! # Wire Envelope
//!
//! Every payload is an ASCII tag immediately followed by a JSON body:
//!
//! ```text
//! tran{"sender":"0x145287",...}
//! preprepare{"view":0,"sequence":1,...}
//! ```
//!
//! Payloads are decoded exactly once, at the transport boundary.

use super::error::CodecError;
use ql_01_ledger::Transaction;
use ql_03_consensus::ConsensusMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const TAG_TRANSACTION: &str = "tran";
pub const TAG_PRE_PREPARE: &str = "preprepare";
pub const TAG_PREPARE: &str = "prepare";
pub const TAG_COMMIT: &str = "commit";
pub const TAG_VIEW_CHANGE: &str = "viewchange";
pub const TAG_CHECKPOINT: &str = "checkpoint";

/// Tags in match order: `preprepare` must be tried before its suffix `prepare`.
const TAGS: [&str; 6] = [
    TAG_TRANSACTION,
    TAG_PRE_PREPARE,
    TAG_PREPARE,
    TAG_COMMIT,
    TAG_VIEW_CHANGE,
    TAG_CHECKPOINT,
];

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Transaction(Transaction),
    Consensus(ConsensusMessage),
}

impl WireMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Transaction(_) => TAG_TRANSACTION,
            Self::Consensus(message) => message.kind(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let tag = self.tag();
        match self {
            Self::Transaction(tx) => frame(tag, tx),
            Self::Consensus(ConsensusMessage::PrePrepare(m)) => frame(tag, m),
            Self::Consensus(ConsensusMessage::Prepare(m)) => frame(tag, m),
            Self::Consensus(ConsensusMessage::Commit(m)) => frame(tag, m),
            Self::Consensus(ConsensusMessage::ViewChange(m)) => frame(tag, m),
            Self::Consensus(ConsensusMessage::Checkpoint(m)) => frame(tag, m),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Empty);
        }
        let tag: &'static str = TAGS
            .into_iter()
            .find(|tag| payload.starts_with(tag.as_bytes()))
            .ok_or_else(|| CodecError::UnknownTag(preview(payload)))?;
        let body = &payload[tag.len()..];

        let message = match tag {
            TAG_TRANSACTION => Self::Transaction(body_of(tag, body)?),
            TAG_PRE_PREPARE => Self::Consensus(ConsensusMessage::PrePrepare(body_of(tag, body)?)),
            TAG_PREPARE => Self::Consensus(ConsensusMessage::Prepare(body_of(tag, body)?)),
            TAG_COMMIT => Self::Consensus(ConsensusMessage::Commit(body_of(tag, body)?)),
            TAG_VIEW_CHANGE => Self::Consensus(ConsensusMessage::ViewChange(body_of(tag, body)?)),
            _ => Self::Consensus(ConsensusMessage::Checkpoint(body_of(tag, body)?)),
        };
        Ok(message)
    }
}

impl From<ConsensusMessage> for WireMessage {
    fn from(message: ConsensusMessage) -> Self {
        Self::Consensus(message)
    }
}

impl From<Transaction> for WireMessage {
    fn from(tx: Transaction) -> Self {
        Self::Transaction(tx)
    }
}

fn frame<T: Serialize>(tag: &'static str, body: &T) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(body).map_err(|source| CodecError::Json { tag, source })?;
    let mut payload = Vec::with_capacity(tag.len() + json.len());
    payload.extend_from_slice(tag.as_bytes());
    payload.extend_from_slice(&json);
    Ok(payload)
}

fn body_of<T: DeserializeOwned>(tag: &'static str, body: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(body).map_err(|source| CodecError::Json { tag, source })
}

/// First bytes of an unrecognised payload, for logging.
fn preview(payload: &[u8]) -> String {
    let end = payload.len().min(16);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}
