//! # TCP Cluster
//!
//! Four nodes on ephemeral localhost ports, keys persisted through the PEM
//! key store, the way `quorum-node run` wires a replica.

#[cfg(test)]
mod tests {
    use crate::support::{block_at, broadcast_transaction, client, eventually, fast_settings};
    use futures::future::join_all;
    use node_runtime::{Node, NodeDependencies};
    use ql_03_consensus::ValidatorSet;
    use ql_04_transport::adapters::{TcpConfig, TcpTransport};
    use shared_crypto::KeyStore;
    use shared_types::{Address, NodeId, NodeTable};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    async fn free_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_four_nodes_over_tcp() {
        let keys = tempfile::tempdir().unwrap();
        let store = KeyStore::new(keys.path());

        let mut pairs = Vec::new();
        for k in 1..=4 {
            pairs.push((format!("Node{k}"), free_address().await));
        }
        let table = NodeTable::from_pairs(pairs.clone()).unwrap();
        for (id, _) in &pairs {
            store.load_or_generate(id).unwrap();
        }
        let validators = ValidatorSet::new(
            pairs
                .iter()
                .map(|(id, _)| (NodeId::new(id.clone()), store.load_public(id).unwrap())),
        )
        .unwrap();

        let nodes: Vec<Node<TcpTransport>> = pairs
            .iter()
            .map(|(id, _)| {
                Node::new(NodeDependencies {
                    id: NodeId::new(id.clone()),
                    keypair: store.load(id).unwrap(),
                    table: table.clone(),
                    validators: validators.clone(),
                    transport: Arc::new(TcpTransport::new(TcpConfig::default())),
                    settings: fast_settings(),
                })
                .unwrap()
            })
            .collect();
        for node in &nodes {
            node.start();
        }
        for (_, address) in &pairs {
            let mut up = false;
            for _ in 0..100 {
                if TcpStream::connect(address).await.is_ok() {
                    up = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(up, "{address} never started listening");
        }

        let mut alice = client("alice", "0xA");
        let tx = alice.transfer(&Address::new("0xB"), 10.0, 0.5).unwrap().unwrap();
        let transport = TcpTransport::default();
        assert_eq!(broadcast_transaction(&alice, &transport, &table, &tx).await, 4);

        let committed = eventually(Duration::from_secs(10), || {
            nodes.iter().all(|node| node.height() == 1)
        })
        .await;
        assert!(committed);

        let expected = block_at(&nodes[0], 1).unwrap();
        assert_eq!(expected.transactions, vec![tx]);
        for node in &nodes {
            assert_eq!(block_at(node, 1).unwrap().hash(), expected.hash());
        }

        join_all(nodes.iter().map(|node| node.shutdown())).await;
    }
}
