//! JSON snapshot export of a ledger.
//!
//! Exports are read-only snapshots. Reading one back rebuilds the chain
//! through `Ledger::append`, so a tampered file fails linkage validation.

use crate::domain::{Block, Ledger, LedgerError};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::Hash;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Exported chain is invalid: {0}")]
    InvalidChain(#[from] LedgerError),

    #[error("Exported chain has no genesis block")]
    Empty,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportedBlock {
    #[serde_as(as = "Hex")]
    hash: Hash,
    #[serde(flatten)]
    block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportDocument {
    height: u64,
    blocks: Vec<ExportedBlock>,
}

/// Ledger JSON export.
pub struct LedgerExport;

impl LedgerExport {
    /// Pretty JSON of every block, each annotated with its hash.
    pub fn to_json(ledger: &Ledger) -> Result<String, ExportError> {
        let document = ExportDocument {
            height: ledger.height(),
            blocks: ledger
                .blocks()
                .iter()
                .map(|block| ExportedBlock {
                    hash: block.hash(),
                    block: block.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Rebuild a ledger from exported JSON, validating every link.
    pub fn from_json(json: &str) -> Result<Ledger, ExportError> {
        let document: ExportDocument = serde_json::from_str(json)?;
        let mut blocks = document.blocks.into_iter().map(|entry| entry.block);
        let genesis = blocks.next().ok_or(ExportError::Empty)?;
        let mut ledger = Ledger::new(genesis)?;
        for block in blocks {
            ledger.append(block)?;
        }
        Ok(ledger)
    }

    pub fn write_json(ledger: &Ledger, path: &Path) -> Result<(), ExportError> {
        let json = Self::to_json(ledger)?;
        fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), height = ledger.height(), "Ledger exported");
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Ledger, ExportError> {
        let json = fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
