//! # NodeTable
//!
//! Static directory mapping logical node ids to `host:port` addresses.
//! Built once at startup and handed to each node by value.

use crate::entities::NodeId;
use crate::errors::DirectoryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered `NodeId -> address` map.
///
/// INVARIANTS:
/// - At least one member
/// - Every address has a host and a numeric port
/// - No two members share an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<NodeId, String>", into = "BTreeMap<NodeId, String>")]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, String>,
}

impl NodeTable {
    /// Build a validated table.
    pub fn new(nodes: BTreeMap<NodeId, String>) -> Result<Self, DirectoryError> {
        if nodes.is_empty() {
            return Err(DirectoryError::Empty);
        }

        let mut seen: HashMap<&str, &NodeId> = HashMap::new();
        for (id, address) in &nodes {
            if !is_host_port(address) {
                return Err(DirectoryError::InvalidAddress {
                    node: id.to_string(),
                    address: address.clone(),
                });
            }
            if let Some(first) = seen.insert(address.as_str(), id) {
                return Err(DirectoryError::DuplicateAddress {
                    address: address.clone(),
                    first: first.to_string(),
                    second: id.to_string(),
                });
            }
        }

        Ok(Self { nodes })
    }

    /// Build from `(id, address)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DirectoryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let nodes = pairs
            .into_iter()
            .map(|(k, v)| (NodeId::new(k), v.into()))
            .collect();
        Self::new(nodes)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resolve a node's address.
    pub fn address_of(&self, id: &NodeId) -> Result<&str, DirectoryError> {
        self.nodes
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::UnknownNode(id.to_string()))
    }

    /// Node ids in rotation order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// `(id, address)` pairs in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        self.nodes.iter().map(|(id, addr)| (id, addr.as_str()))
    }

    /// Every member except `local`.
    pub fn peers<'a>(&'a self, local: &'a NodeId) -> impl Iterator<Item = (&'a NodeId, &'a str)> {
        self.iter().filter(move |(id, _)| *id != local)
    }

    /// Member at `position` in rotation order, wrapping around.
    pub fn at_rotation(&self, position: u64) -> &NodeId {
        let index = (position % self.nodes.len() as u64) as usize;
        // index < len, and construction rejects empty tables
        self.nodes
            .keys()
            .nth(index)
            .unwrap_or_else(|| unreachable!("NodeTable is never empty"))
    }
}

impl TryFrom<BTreeMap<NodeId, String>> for NodeTable {
    type Error = DirectoryError;

    fn try_from(nodes: BTreeMap<NodeId, String>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

impl From<NodeTable> for BTreeMap<NodeId, String> {
    fn from(table: NodeTable) -> Self {
        table.nodes
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
