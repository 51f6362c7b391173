//! # Local Cluster
//!
//! `n` nodes in one process on a shared `MemoryNetwork`, with generated
//! keys and a common genesis. Nodes are named `Node1..NodeN` and listen on
//! `nodeK:7000+K`.

use crate::client::{ClientReport, SimulatedClient};
use crate::node::{Node, NodeDependencies, NodeError, NodeSettings};
use ql_01_ledger::Ledger;
use ql_03_consensus::ValidatorSet;
use ql_04_transport::adapters::{MemoryNetwork, MemoryTransport};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{Address, Hash, NodeId, NodeTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const LISTEN_ATTEMPTS: usize = 1_000;

pub struct LocalCluster {
    network: MemoryNetwork,
    table: NodeTable,
    nodes: Vec<Node<MemoryTransport>>,
}

impl LocalCluster {
    /// Build and start `n` nodes; returns once every listener is up.
    pub async fn spawn(n: usize, settings: NodeSettings) -> Result<Self, NodeError> {
        let cluster = Self::build(n, settings)?;
        for node in &cluster.nodes {
            node.start();
        }
        for _ in 0..LISTEN_ATTEMPTS {
            if cluster.nodes.iter().all(|node| cluster.network.is_listening(node.address())) {
                break;
            }
            tokio::task::yield_now().await;
        }
        info!(nodes = n, "Local cluster running");
        Ok(cluster)
    }

    /// Build `n` nodes without starting them.
    pub fn build(n: usize, settings: NodeSettings) -> Result<Self, NodeError> {
        let network = MemoryNetwork::new();
        let members: Vec<(NodeId, String, Secp256k1KeyPair)> = (1..=n)
            .map(|k| {
                (
                    NodeId::new(format!("Node{k}")),
                    format!("node{k}:{}", 7000 + k),
                    Secp256k1KeyPair::generate(),
                )
            })
            .collect();

        let table = NodeTable::from_pairs(
            members
                .iter()
                .map(|(id, address, _)| (id.to_string(), address.clone())),
        )?;
        let validators = ValidatorSet::new(
            members
                .iter()
                .map(|(id, _, keypair)| (id.clone(), keypair.public_key())),
        )?;

        let nodes = members
            .into_iter()
            .map(|(id, address, keypair)| {
                Node::new(NodeDependencies {
                    id,
                    keypair,
                    table: table.clone(),
                    validators: validators.clone(),
                    transport: Arc::new(network.transport(address)),
                    settings: settings.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            network,
            table,
            nodes,
        })
    }

    pub fn nodes(&self) -> &[Node<MemoryTransport>] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node<MemoryTransport>> {
        self.nodes.iter().find(|node| node.id().as_str() == id)
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Transport for a client outside the NodeTable.
    pub fn client_transport(&self, name: &str) -> MemoryTransport {
        self.network.transport(format!("client-{name}:0"))
    }

    /// Broadcast a client's random transfers to every node.
    pub async fn run_client(
        &self,
        client: &mut SimulatedClient,
        receivers: &[Address],
        count: usize,
    ) -> ClientReport {
        let transport = self.client_transport(client.id());
        client.run(&transport, &self.table, receivers, count).await
    }

    /// Wait until every node in `nodes` satisfies `done`, or `timeout` passes.
    pub async fn wait_until<'a>(
        &'a self,
        nodes: impl Iterator<Item = &'a Node<MemoryTransport>> + Clone,
        timeout: Duration,
        done: impl Fn(&Node<MemoryTransport>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if nodes.clone().all(&done) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until every node has at least `transactions` committed.
    pub async fn wait_for_transactions(&self, transactions: usize, timeout: Duration) -> bool {
        self.wait_until(self.nodes.iter(), timeout, |node| {
            node.with_ledger(committed_transactions) >= transactions
        })
        .await
    }

    /// Ledger tail hashes per node, in NodeTable order.
    pub fn tail_hashes(&self) -> Vec<(NodeId, u64, Hash)> {
        self.nodes
            .iter()
            .map(|node| {
                let (height, hash) = node.with_ledger(|ledger| (ledger.height(), ledger.tail_hash()));
                (node.id().clone(), height, hash)
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

/// Transactions across every block of `ledger`.
pub fn committed_transactions(ledger: &Ledger) -> usize {
    ledger.blocks().iter().map(|block| block.transactions.len()).sum()
}
