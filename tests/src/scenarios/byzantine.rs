//! # Faulty Primaries and Crashed Replicas
//!
//! With `N = 4` the cluster tolerates one faulty member:
//!
//! - a primary whose PrePrepare digest does not match its block is voted
//!   out immediately and the next primary commits the pending work
//! - a primary that never proposes is replaced once the round times out
//! - a crashed replica does not stop the other three from committing

#[cfg(test)]
mod tests {
    use crate::support::{
        await_listeners, block_at, broadcast_transaction, client, eventually, fast_settings,
        Members,
    };
    use node_runtime::LocalCluster;
    use ql_01_ledger::{Block, Ledger};
    use ql_03_consensus::{ConsensusMessage, PrePrepare};
    use ql_04_transport::adapters::MemoryNetwork;
    use ql_04_transport::{Transport, WireMessage};
    use shared_types::{now_millis, Address};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_bad_digest_primary_is_replaced() {
        let members = Members::generate(4);
        let network = MemoryNetwork::new();
        let honest: Vec<_> = (1..4)
            .map(|k| members.memory_node(k, &network, fast_settings()))
            .collect();
        for node in &honest {
            node.start();
        }
        await_listeners(&network, &[members.address(1), members.address(2), members.address(3)])
            .await;

        let mut alice = client("alice", "0xA");
        let tx = alice.transfer(&Address::new("0xB"), 10.0, 0.5).unwrap().unwrap();
        let transport = network.transport("client-alice:0");
        assert_eq!(broadcast_transaction(&alice, &transport, &members.table, &tx).await, 3);

        // Node1 signs the real digest, then tampers with the body it ships
        let genesis = Ledger::with_genesis(&members.ids[0]).genesis_hash();
        let block = Block::new(1, genesis, vec![tx.clone()], now_millis(), members.ids[0].clone());
        let mut forged = PrePrepare::new(0, block, members.ids[0].clone(), &members.keypairs[0]);
        forged.block.timestamp += 1;
        let faulty_hash = forged.block.hash();
        let payload = WireMessage::from(ConsensusMessage::PrePrepare(forged)).encode().unwrap();
        let byzantine = network.transport(members.address(0));
        for k in 1..4 {
            byzantine.send(&payload, members.address(k)).await.unwrap();
        }

        let committed = eventually(WAIT, || honest.iter().all(|node| node.height() == 1)).await;
        assert!(committed, "honest nodes did not commit after the view change");

        let expected = block_at(&honest[0], 1).unwrap();
        assert_eq!(expected.proposer.as_str(), "Node2");
        assert_eq!(expected.transactions, vec![tx]);
        assert_ne!(expected.hash(), faulty_hash);
        for node in &honest {
            let status = node.status();
            assert_eq!(status.view, 1);
            assert_eq!(status.primary.as_str(), "Node2");
            assert_eq!(block_at(node, 1).unwrap().hash(), expected.hash());
        }

        for node in &honest {
            node.shutdown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_primary_is_replaced() {
        let cluster = LocalCluster::spawn(4, fast_settings()).await.unwrap();
        cluster.network().disconnect(cluster.nodes()[0].address());

        let mut alice = client("alice", "0xA");
        let tx = alice.transfer(&Address::new("0xB"), 10.0, 0.5).unwrap().unwrap();
        let transport = cluster.client_transport("alice");
        assert_eq!(broadcast_transaction(&alice, &transport, cluster.table(), &tx).await, 3);

        let replicas = &cluster.nodes()[1..];
        let committed = cluster
            .wait_until(replicas.iter(), WAIT, |node| node.height() == 1)
            .await;
        assert!(committed, "replicas did not replace the silent primary");

        for node in replicas {
            let status = node.status();
            assert_eq!(status.view, 1);
            assert_eq!(status.primary.as_str(), "Node2");
            assert!(!status.view_changing);
            assert_eq!(block_at(node, 1).unwrap().proposer.as_str(), "Node2");
        }
        assert_eq!(cluster.nodes()[0].height(), 0);

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_crashed_replica_does_not_block_commit() {
        let cluster = LocalCluster::spawn(4, fast_settings()).await.unwrap();
        cluster.network().disconnect(cluster.nodes()[3].address());

        let mut alice = client("alice", "0xA");
        cluster.run_client(&mut alice, &[Address::new("0xB")], 3).await;

        let live = &cluster.nodes()[..3];
        let committed = cluster
            .wait_until(live.iter(), WAIT, |node| {
                node.with_ledger(node_runtime::cluster::committed_transactions) == 3
            })
            .await;
        assert!(committed);
        assert_eq!(cluster.nodes()[3].height(), 0);

        cluster.shutdown().await;
    }
}
