//! # Node Configuration
//!
//! One TOML file per node. Every section has defaults, so a minimal file
//! only names the local node and the NodeTable:
//!
//! ```toml
//! node_id = "Node1"
//!
//! [nodes]
//! Node1 = "127.0.0.1:7001"
//! Node2 = "127.0.0.1:7002"
//! Node3 = "127.0.0.1:7003"
//! Node4 = "127.0.0.1:7004"
//! ```
//!
//! ## Environment overrides
//!
//! - `QL_NODE_ID`: local node id
//! - `QL_LOG_LEVEL`: log filter (`RUST_LOG` still wins when set)
//! - `QL_JSON_LOGS`: `true`/`false`
//! - `QL_KEY_DIR`: PEM key directory
//! - `QL_VIEW_CHANGE_TIMEOUT_MS`: round timeout

use crate::node::NodeSettings;
use ql_02_mempool::MempoolConfig;
use ql_03_consensus::ConsensusConfig;
use ql_04_transport::adapters::TcpConfig;
use serde::{Deserialize, Serialize};
use shared_types::{DirectoryError, NodeId, NodeTable};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidOverride { var: &'static str, value: String },

    #[error("Invalid NodeTable: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Local node {0} is not in the NodeTable")]
    UnknownLocalNode(String),
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ql_03_consensus=debug`
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: String,
    /// Directory holding `<id>_private_key.pem` and `<id>_public_key.pem`.
    pub key_dir: PathBuf,
    /// Ticker period driving timeouts and proposals (ms).
    pub tick_interval_ms: u64,
    /// Where `run` writes the ledger snapshot on shutdown.
    pub export_path: Option<PathBuf>,
    pub nodes: BTreeMap<String, String>,
    pub logging: LoggingConfig,
    pub consensus: ConsensusConfig,
    pub mempool: MempoolConfig,
    pub tcp: TcpConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "Node1".to_string(),
            key_dir: PathBuf::from("./keys"),
            tick_interval_ms: 100,
            export_path: None,
            nodes: BTreeMap::new(),
            logging: LoggingConfig::default(),
            consensus: ConsensusConfig::default(),
            mempool: MempoolConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `QL_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(id) = lookup("QL_NODE_ID") {
            self.node_id = id;
        }
        if let Some(level) = lookup("QL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("QL_JSON_LOGS") {
            self.logging.json = parse_override("QL_JSON_LOGS", value)?;
        }
        if let Some(dir) = lookup("QL_KEY_DIR") {
            self.key_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("QL_VIEW_CHANGE_TIMEOUT_MS") {
            self.consensus.view_change_timeout_ms =
                parse_override("QL_VIEW_CHANGE_TIMEOUT_MS", value)?;
        }
        Ok(())
    }

    pub fn local_id(&self) -> NodeId {
        NodeId::new(self.node_id.clone())
    }

    /// The validated NodeTable, which must contain the local node.
    pub fn node_table(&self) -> Result<NodeTable, ConfigError> {
        let table = NodeTable::from_pairs(self.nodes.clone())?;
        if !table.contains(&self.local_id()) {
            return Err(ConfigError::UnknownLocalNode(self.node_id.clone()));
        }
        Ok(table)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            consensus: self.consensus.clone(),
            mempool: self.mempool.clone(),
            tick_interval: self.tick_interval(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { var, value })
}
