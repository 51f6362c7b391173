//! Shared fixtures for cluster scenarios.

use node_runtime::{Node, NodeDependencies, NodeSettings, SimulatedClient};
use ql_01_ledger::{Amount, Block, Ledger, Transaction};
use ql_03_consensus::{ConsensusConfig, ValidatorSet};
use ql_04_transport::adapters::{MemoryNetwork, MemoryTransport};
use ql_04_transport::Transport;
use shared_crypto::Secp256k1KeyPair;
use shared_types::{Address, Hash, NodeId, NodeTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Short timeouts so failure scenarios finish quickly.
pub fn fast_settings() -> NodeSettings {
    NodeSettings {
        consensus: ConsensusConfig {
            view_change_timeout_ms: 400,
            ..ConsensusConfig::default()
        },
        tick_interval: Duration::from_millis(20),
        ..NodeSettings::default()
    }
}

/// Identities of an `n`-member cluster, kept so a test can act as any member.
pub struct Members {
    pub ids: Vec<NodeId>,
    pub keypairs: Vec<Secp256k1KeyPair>,
    pub table: NodeTable,
    pub validators: ValidatorSet,
}

impl Members {
    /// `Node1..NodeN` at `nodeK:7000+K`.
    pub fn generate(n: usize) -> Self {
        let addresses: Vec<String> = (1..=n).map(|k| format!("node{k}:{}", 7000 + k)).collect();
        Self::with_addresses(addresses)
    }

    pub fn with_addresses(addresses: Vec<String>) -> Self {
        let ids: Vec<NodeId> = (1..=addresses.len())
            .map(|k| NodeId::new(format!("Node{k}")))
            .collect();
        let keypairs: Vec<Secp256k1KeyPair> =
            ids.iter().map(|_| Secp256k1KeyPair::generate()).collect();
        let table = NodeTable::from_pairs(
            ids.iter()
                .zip(&addresses)
                .map(|(id, address)| (id.to_string(), address.clone())),
        )
        .unwrap();
        let validators = ValidatorSet::new(
            ids.iter()
                .cloned()
                .zip(keypairs.iter().map(|keypair| keypair.public_key())),
        )
        .unwrap();
        Self {
            ids,
            keypairs,
            table,
            validators,
        }
    }

    pub fn address(&self, index: usize) -> &str {
        self.table.address_of(&self.ids[index]).unwrap()
    }

    /// Build member `index` on `transport`.
    pub fn node<T: Transport>(
        &self,
        index: usize,
        transport: T,
        settings: NodeSettings,
    ) -> Node<T> {
        Node::new(NodeDependencies {
            id: self.ids[index].clone(),
            keypair: self.keypairs[index].clone(),
            table: self.table.clone(),
            validators: self.validators.clone(),
            transport: Arc::new(transport),
            settings,
        })
        .unwrap()
    }

    pub fn memory_node(
        &self,
        index: usize,
        network: &MemoryNetwork,
        settings: NodeSettings,
    ) -> Node<MemoryTransport> {
        self.node(index, network.transport(self.address(index)), settings)
    }

    /// The genesis every member starts from.
    pub fn genesis_hash(&self) -> Hash {
        Ledger::with_genesis(&self.ids[0]).genesis_hash()
    }
}

/// Poll until `done` holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until every listed memory endpoint has a live listener.
pub async fn await_listeners(network: &MemoryNetwork, addresses: &[&str]) {
    let ready = eventually(Duration::from_secs(5), || {
        addresses.iter().all(|address| network.is_listening(address))
    })
    .await;
    assert!(ready, "listeners did not come up: {addresses:?}");
}

/// A funded client with a fixed address.
pub fn client(name: &str, address: &str) -> SimulatedClient {
    SimulatedClient::with_keypair(
        name,
        Address::new(address),
        Amount::from_decimal(1_000.0).unwrap(),
        Secp256k1KeyPair::generate(),
    )
}

/// Send `tx` to every member from a client endpoint.
pub async fn broadcast_transaction<T: Transport>(
    client: &SimulatedClient,
    transport: &T,
    table: &NodeTable,
    tx: &Transaction,
) -> usize {
    client.submit(transport, table, tx).await.unwrap()
}

/// The block at `index` on `node`, if appended.
pub fn block_at<T: Transport>(node: &Node<T>, index: u64) -> Option<Block> {
    node.with_ledger(|ledger| ledger.get(index).cloned())
}
