//! # End-to-End Flow
//!
//! ```text
//! client ──tran──→ all nodes ──→ mempool
//! Node1 (primary) ──PrePrepare──→ replicas ──Prepare/Commit──→ all
//!                                                   │
//!                                                   ↓
//!                                   identical block on every ledger
//! ```

#[cfg(test)]
mod tests {
    use crate::support::{block_at, broadcast_transaction, client, fast_settings};
    use node_runtime::cluster::committed_transactions;
    use node_runtime::{LocalCluster, NodeSettings};
    use ql_01_ledger::{Amount, LedgerExport};
    use shared_types::Address;
    use std::collections::HashSet;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_single_transaction_commits_everywhere() {
        let cluster = LocalCluster::spawn(4, NodeSettings::default()).await.unwrap();
        let mut alice = client("alice", "0xA");
        let tx = alice.transfer(&Address::new("0xB"), 10.0, 0.5).unwrap().unwrap();

        let transport = cluster.client_transport("alice");
        assert_eq!(broadcast_transaction(&alice, &transport, cluster.table(), &tx).await, 4);
        assert!(cluster.wait_for_transactions(1, WAIT).await);

        let expected = block_at(&cluster.nodes()[0], 1).unwrap();
        assert_eq!(expected.transactions, vec![tx.clone()]);
        assert_eq!(expected.transactions[0].amount, Amount::from_decimal(10.0).unwrap());
        assert_eq!(expected.transactions[0].fee, Amount::from_decimal(0.5).unwrap());
        assert_eq!(expected.proposer.as_str(), "Node1");
        for node in cluster.nodes() {
            assert_eq!(node.height(), 1, "{} height", node.id());
            assert_eq!(block_at(node, 1).unwrap().hash(), expected.hash());
            assert_eq!(node.pool_len(), 0);
        }

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_many_clients_converge() {
        let cluster = LocalCluster::spawn(4, fast_settings()).await.unwrap();
        let mut alice = client("alice", "0xA");
        let mut bob = client("bob", "0xB");

        let sent_a = cluster.run_client(&mut alice, &[Address::new("0xB")], 8).await;
        let sent_b = cluster.run_client(&mut bob, &[Address::new("0xA")], 8).await;
        let total = sent_a.submitted + sent_b.submitted;
        assert_eq!(total, 16);
        assert!(cluster.wait_for_transactions(total, WAIT).await);

        let tails = cluster.tail_hashes();
        assert!(tails.windows(2).all(|pair| pair[0].1 == pair[1].1 && pair[0].2 == pair[1].2));

        for node in cluster.nodes() {
            node.with_ledger(|ledger| {
                ledger.verify_chain().unwrap();
                assert_eq!(committed_transactions(ledger), total);
                let unique: HashSet<_> = ledger
                    .blocks()
                    .iter()
                    .flat_map(|block| block.transaction_hashes())
                    .collect();
                assert_eq!(unique.len(), total, "each transaction committed exactly once");
            });
        }

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_committed_blocks_carry_quorum_certificates() {
        let cluster = LocalCluster::spawn(4, fast_settings()).await.unwrap();
        let mut alice = client("alice", "0xA");
        cluster.run_client(&mut alice, &[Address::new("0xB")], 3).await;
        assert!(cluster.wait_for_transactions(3, WAIT).await);

        let node = &cluster.nodes()[2];
        node.with_ledger(|ledger| {
            for block in ledger.blocks().iter().skip(1) {
                assert!(!block.certificate.is_empty(), "block {} uncertified", block.index);
            }
        });

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_exported_ledger_round_trips() {
        let cluster = LocalCluster::spawn(4, fast_settings()).await.unwrap();
        let mut alice = client("alice", "0xA");
        cluster.run_client(&mut alice, &[Address::new("0xB")], 4).await;
        assert!(cluster.wait_for_transactions(4, WAIT).await);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = cluster.nodes()[0].ledger();
        LedgerExport::write_json(&ledger, &path).unwrap();
        let restored = LedgerExport::read_json(&path).unwrap();

        assert_eq!(restored.blocks(), ledger.blocks());
        restored.verify_chain().unwrap();

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_rebroadcast_transaction_committed_once() {
        let mut settings = fast_settings();
        settings.mempool.committed_memory = 1;
        let cluster = LocalCluster::spawn(4, settings).await.unwrap();
        let mut alice = client("alice", "0xA");
        let transport = cluster.client_transport("alice");
        let first = alice.transfer(&Address::new("0xB"), 1.0, 0.1).unwrap().unwrap();
        broadcast_transaction(&alice, &transport, cluster.table(), &first).await;
        assert!(cluster.wait_for_transactions(1, WAIT).await);

        let second = alice.transfer(&Address::new("0xB"), 2.0, 0.1).unwrap().unwrap();
        broadcast_transaction(&alice, &transport, cluster.table(), &second).await;
        assert!(cluster.wait_for_transactions(2, WAIT).await);

        broadcast_transaction(&alice, &transport, cluster.table(), &first).await;
        let third = alice.transfer(&Address::new("0xB"), 3.0, 0.1).unwrap().unwrap();
        broadcast_transaction(&alice, &transport, cluster.table(), &third).await;
        assert!(cluster.wait_for_transactions(3, WAIT).await);

        for node in cluster.nodes() {
            node.with_ledger(|ledger| {
                let hashes: Vec<_> = ledger
                    .blocks()
                    .iter()
                    .flat_map(|block| block.transaction_hashes())
                    .collect();
                let unique: HashSet<_> = hashes.iter().collect();
                assert_eq!(hashes.len(), 3, "{} ledger", node.id());
                assert_eq!(unique.len(), 3);
            });
        }

        cluster.shutdown().await;
    }
}
