//! # Checkpoints
//!
//! Every `checkpoint_interval` blocks each node broadcasts a Checkpoint;
//! `2f+1` matching ones make it stable and the log below it is dropped.

#[cfg(test)]
mod tests {
    use crate::support::{client, fast_settings};
    use node_runtime::{LocalCluster, NodeSettings};
    use ql_03_consensus::ConsensusConfig;
    use shared_types::Address;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn one_per_block(checkpoint_interval: u64) -> NodeSettings {
        let base = fast_settings();
        NodeSettings {
            consensus: ConsensusConfig {
                max_batch_size: 1,
                checkpoint_interval,
                ..base.consensus
            },
            ..base
        }
    }

    #[tokio::test]
    async fn test_stable_checkpoint_collects_log() {
        let cluster = LocalCluster::spawn(4, one_per_block(2)).await.unwrap();
        let mut alice = client("alice", "0xA");
        let report = cluster.run_client(&mut alice, &[Address::new("0xB")], 5).await;
        assert_eq!(report.submitted, 5);
        assert!(cluster.wait_for_transactions(5, WAIT).await);

        let stable = cluster
            .wait_until(cluster.nodes().iter(), WAIT, |node| {
                node.status().stable_checkpoint == 4
            })
            .await;
        assert!(stable, "checkpoint 4 never became stable");

        for node in cluster.nodes() {
            let status = node.status();
            assert_eq!(status.last_appended, 5);
            assert!(status.log_entries <= 1, "{} kept {} entries", node.id(), status.log_entries);
            // Blocks are never pruned by consensus GC
            assert_eq!(node.height(), 5);
        }

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_checkpoint_before_interval() {
        let cluster = LocalCluster::spawn(4, one_per_block(10)).await.unwrap();
        let mut alice = client("alice", "0xA");
        cluster.run_client(&mut alice, &[Address::new("0xB")], 3).await;
        assert!(cluster.wait_for_transactions(3, WAIT).await);

        for node in cluster.nodes() {
            let status = node.status();
            assert_eq!(status.stable_checkpoint, 0);
            assert_eq!(status.log_entries, 3);
        }

        cluster.shutdown().await;
    }
}
