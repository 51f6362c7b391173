use super::*;
use crate::domain::{
    Checkpoint, Commit, ConsensusError, PrePrepare, Prepare, PreparedProof, ViewChange,
};
use crate::ports::LedgerTail;
use parking_lot::Mutex;
use ql_01_ledger::{Block, Ledger, LedgerError};
use shared_crypto::{Secp256k1KeyPair, Secp256k1Signature};
use shared_types::Hash;
use std::time::Duration;

// Mock implementations for testing
#[derive(Default)]
struct RecordingBroadcaster {
    sent: Mutex<Vec<ConsensusMessage>>,
}

impl RecordingBroadcaster {
    fn take(&self) -> Vec<ConsensusMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, message: ConsensusMessage) -> Result<(), String> {
        self.sent.lock().push(message);
        Ok(())
    }
}

struct MemoryLedger {
    ledger: Mutex<Ledger>,
}

impl LedgerPort for MemoryLedger {
    fn tail(&self) -> LedgerTail {
        let ledger = self.ledger.lock();
        LedgerTail {
            index: ledger.height(),
            hash: ledger.tail_hash(),
        }
    }

    fn append(&self, block: Block) -> Result<(), LedgerError> {
        self.ledger.lock().append(block)
    }

    fn contains_transaction(&self, hash: &Hash) -> bool {
        self.ledger.lock().contains_transaction(hash)
    }
}

struct Harness {
    keys: Vec<(NodeId, Secp256k1KeyPair)>,
    service: ConsensusService<RecordingBroadcaster, MemoryLedger>,
    broadcaster: Arc<RecordingBroadcaster>,
    ledger: Arc<MemoryLedger>,
}

fn harness(local: usize) -> Harness {
    harness_with(local, ConsensusConfig::default())
}

/// Four validators `Node1..Node4`; the service runs as `keys[local]`.
fn harness_with(local: usize, config: ConsensusConfig) -> Harness {
    let keys: Vec<_> = (1..=4)
        .map(|i| (NodeId::new(format!("Node{i}")), Secp256k1KeyPair::generate()))
        .collect();
    let validators =
        ValidatorSet::new(keys.iter().map(|(id, kp)| (id.clone(), kp.public_key()))).unwrap();
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let ledger = Arc::new(MemoryLedger {
        ledger: Mutex::new(Ledger::with_genesis(&NodeId::new("Node1"))),
    });
    let service = ConsensusService::new(ConsensusDependencies {
        broadcaster: broadcaster.clone(),
        ledger: ledger.clone(),
        validators,
        node_id: keys[local].0.clone(),
        keypair: keys[local].1.clone(),
        config,
    })
    .unwrap();
    Harness {
        keys,
        service,
        broadcaster,
        ledger,
    }
}

impl Harness {
    fn height(&self) -> u64 {
        self.ledger.ledger.lock().height()
    }

    fn transaction(&self) -> Transaction {
        Transaction::create("0xA".into(), "0xB".into(), 10.0, 0.5, &Secp256k1KeyPair::generate())
            .unwrap()
    }

    /// Block at `sequence` proposed by the primary of `view`.
    fn block(&self, view: u64, sequence: u64, prev_hash: Hash) -> Block {
        let proposer = self.keys[(view % 4) as usize].0.clone();
        Block::new(sequence, prev_hash, vec![self.transaction()], 1, proposer)
    }

    fn pre_prepare(&self, view: u64, block: Block) -> PrePrepare {
        let (id, kp) = &self.keys[(view % 4) as usize];
        PrePrepare::new(view, block, id.clone(), kp)
    }

    fn prepare(&self, from: usize, pp: &PrePrepare) -> ConsensusMessage {
        let (id, kp) = &self.keys[from];
        ConsensusMessage::Prepare(Prepare::new(pp.view, pp.sequence, pp.digest, id.clone(), kp))
    }

    fn commit(&self, from: usize, pp: &PrePrepare) -> ConsensusMessage {
        let (id, kp) = &self.keys[from];
        ConsensusMessage::Commit(Commit::new(pp.view, pp.sequence, pp.digest, id.clone(), kp))
    }

    fn view_change(&self, from: usize, new_view: u64) -> ConsensusMessage {
        let (id, kp) = &self.keys[from];
        ConsensusMessage::ViewChange(ViewChange::new(new_view, id.clone(), 0, vec![], kp))
    }

    async fn deliver(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        self.service.handle_message(message).await
    }
}

fn kinds(messages: &[ConsensusMessage]) -> Vec<&'static str> {
    messages.iter().map(ConsensusMessage::kind).collect()
}

#[tokio::test]
async fn test_commit_requires_quorum() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));

    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    assert_eq!(kinds(&h.broadcaster.take()), vec!["prepare"]);

    // Own Prepare plus the primary's: 2 of 3
    h.deliver(h.prepare(0, &pp)).await.unwrap();
    assert!(h.broadcaster.take().is_empty());

    h.deliver(h.prepare(2, &pp)).await.unwrap();
    assert_eq!(kinds(&h.broadcaster.take()), vec!["commit"]);

    // Own Commit plus one; a repeated vote does not count twice
    h.deliver(h.commit(0, &pp)).await.unwrap();
    h.deliver(h.commit(0, &pp)).await.unwrap();
    assert_eq!(h.height(), 0);

    h.deliver(h.commit(2, &pp)).await.unwrap();
    assert_eq!(h.height(), 1);

    let ledger = h.ledger.ledger.lock();
    let block = ledger.get(1).unwrap();
    assert_eq!(block.hash(), pp.digest);
    assert_eq!(block.certificate.votes.len(), 3);
    assert!(block
        .certificate
        .verify(&pp.digest, 3, h.service.validators().directory()));
}

#[tokio::test]
async fn test_duplicate_commit_after_quorum_is_noop() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    for from in [0, 2] {
        h.deliver(h.prepare(from, &pp)).await.unwrap();
    }
    for from in [0, 2] {
        h.deliver(h.commit(from, &pp)).await.unwrap();
    }
    assert_eq!(h.height(), 1);

    let late = h.deliver(h.commit(3, &pp)).await;

    assert!(matches!(late, Err(ConsensusError::StaleMessage { sequence: 1, .. })));
    assert_eq!(h.height(), 1);
}

#[tokio::test]
async fn test_out_of_order_votes_reach_same_decision() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));

    for from in [0, 2] {
        h.deliver(h.commit(from, &pp)).await.unwrap();
    }
    for from in [0, 2] {
        h.deliver(h.prepare(from, &pp)).await.unwrap();
    }
    assert_eq!(h.height(), 0);

    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();

    assert_eq!(h.height(), 1);
    assert_eq!(kinds(&h.broadcaster.take()), vec!["prepare", "commit"]);
}

#[tokio::test]
async fn test_later_sequence_waits_for_predecessor() {
    let h = harness(1);
    let first = h.block(0, 1, h.ledger.tail().hash);
    let second = h.block(0, 2, first.hash());
    let pp1 = h.pre_prepare(0, first);
    let pp2 = h.pre_prepare(0, second);

    for pp in [&pp2, &pp1] {
        h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
        for from in [0, 2] {
            h.deliver(h.prepare(from, pp)).await.unwrap();
        }
        for from in [0, 2] {
            h.deliver(h.commit(from, pp)).await.unwrap();
        }
        if pp.sequence == 2 {
            assert_eq!(h.height(), 0, "sequence 2 must wait for 1");
        }
    }

    assert_eq!(h.height(), 2);
    assert_eq!(h.ledger.ledger.lock().get(2).unwrap().hash(), pp2.digest);
}

#[tokio::test]
async fn test_invalid_sender_rejected() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));

    let forged = Prepare::new(0, 1, pp.digest, h.keys[2].0.clone(), &h.keys[3].1);
    let result = h.deliver(ConsensusMessage::Prepare(forged)).await;
    assert!(matches!(result, Err(ConsensusError::InvalidSignature { kind: "prepare", .. })));

    let outsider = Prepare::new(0, 1, pp.digest, NodeId::new("Node9"), &h.keys[3].1);
    let result = h.deliver(ConsensusMessage::Prepare(outsider)).await;
    assert!(matches!(result, Err(ConsensusError::UnknownReplica(_))));

    let mut unsigned = pp;
    unsigned.signature = Secp256k1Signature::from_bytes([7u8; 64]);
    let result = h.deliver(ConsensusMessage::PrePrepare(unsigned)).await;
    assert!(matches!(result, Err(ConsensusError::InvalidSignature { .. })));
    assert_eq!(h.service.status().log_entries, 0);
}

#[tokio::test]
async fn test_pre_prepare_from_non_primary_rejected() {
    let h = harness(2);
    let block = h.block(0, 1, h.ledger.tail().hash);
    let (id, kp) = &h.keys[1];
    let pp = PrePrepare::new(0, block, id.clone(), kp);

    let result = h.deliver(ConsensusMessage::PrePrepare(pp)).await;

    assert!(matches!(result, Err(ConsensusError::NotPrimary { view: 0, .. })));
    assert!(h.broadcaster.take().is_empty());
}

#[tokio::test]
async fn test_future_view_buffered_and_replayed() {
    let h = harness(2);
    let pp = h.pre_prepare(1, h.block(1, 1, h.ledger.tail().hash));

    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    assert!(h.broadcaster.take().is_empty());
    assert_eq!(h.service.status().log_entries, 0);

    // Two votes for view 1: join, then advance on our own third vote
    h.deliver(h.view_change(0, 1)).await.unwrap();
    h.deliver(h.view_change(3, 1)).await.unwrap();

    let status = h.service.status();
    assert_eq!(status.view, 1);
    assert!(!status.view_changing);
    let sent = h.broadcaster.take();
    assert_eq!(kinds(&sent), vec!["viewchange", "prepare"]);
    match &sent[1] {
        ConsensusMessage::Prepare(p) => assert_eq!((p.view, p.digest), (1, pp.digest)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_digest_mismatch_votes_view_change() {
    let h = harness(1);
    let mut pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    pp.block.timestamp += 1;

    let result = h.deliver(ConsensusMessage::PrePrepare(pp)).await;

    assert!(matches!(result, Err(ConsensusError::DigestMismatch { view: 0, sequence: 1 })));
    let sent = h.broadcaster.take();
    match sent.as_slice() {
        [ConsensusMessage::ViewChange(vc)] => assert_eq!(vc.new_view, 1),
        other => panic!("expected one ViewChange, got {other:?}"),
    }
    assert!(h.service.status().view_changing);
    assert_eq!(h.service.status().log_entries, 0);
}

#[tokio::test]
async fn test_equivocation_votes_view_change() {
    let h = harness(1);
    let tail = h.ledger.tail().hash;
    let first = h.pre_prepare(0, h.block(0, 1, tail));
    let second = h.pre_prepare(0, h.block(0, 1, tail));
    assert_ne!(first.digest, second.digest);

    h.deliver(ConsensusMessage::PrePrepare(first.clone())).await.unwrap();
    h.deliver(ConsensusMessage::PrePrepare(first)).await.unwrap();
    h.broadcaster.take();

    let result = h.deliver(ConsensusMessage::PrePrepare(second)).await;

    assert!(matches!(result, Err(ConsensusError::Equivocation { view: 0, sequence: 1 })));
    assert_eq!(kinds(&h.broadcaster.take()), vec!["viewchange"]);
}

#[tokio::test]
async fn test_proposal_with_wrong_link_rejected() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, [9u8; 32]));

    let result = h.deliver(ConsensusMessage::PrePrepare(pp)).await;

    assert!(matches!(result, Err(ConsensusError::InvalidProposal { sequence: 1, .. })));
    assert!(h.service.status().view_changing);
}

#[tokio::test]
async fn test_primary_proposes_once_at_a_time() {
    let h = harness(0);
    assert!(h.service.is_primary());

    let sequence = h.service.propose(vec![h.transaction()]).await.unwrap();

    assert_eq!(sequence, 1);
    let sent = h.broadcaster.take();
    assert_eq!(kinds(&sent), vec!["preprepare", "prepare"]);
    let again = h.service.propose(vec![h.transaction()]).await;
    assert_eq!(again, Err(ConsensusError::ProposalInFlight(1)));

    // The round completes and frees the primary for the next block
    let ConsensusMessage::PrePrepare(pp) = &sent[0] else {
        panic!("expected PrePrepare");
    };
    for from in [1, 2] {
        h.deliver(h.prepare(from, pp)).await.unwrap();
    }
    for from in [1, 2] {
        h.deliver(h.commit(from, pp)).await.unwrap();
    }
    assert_eq!(h.height(), 1);
    assert_eq!(h.service.propose(vec![h.transaction()]).await, Ok(2));
}

#[tokio::test]
async fn test_propose_rejections() {
    let replica = harness(1);
    let result = replica.service.propose(vec![replica.transaction()]).await;
    assert!(matches!(result, Err(ConsensusError::NotPrimary { .. })));

    let primary = harness(0);
    assert_eq!(primary.service.propose(vec![]).await, Err(ConsensusError::EmptyBatch));

    let mut bad = primary.transaction();
    bad.amount = ql_01_ledger::Amount::from_units(1);
    assert_eq!(primary.service.propose(vec![bad]).await, Err(ConsensusError::EmptyBatch));
    assert!(primary.broadcaster.take().is_empty());
}

#[tokio::test]
async fn test_batch_truncated_to_max_size() {
    let config = ConsensusConfig {
        max_batch_size: 2,
        ..ConsensusConfig::default()
    };
    let h = harness_with(0, config);
    let txs: Vec<_> = (0..5).map(|_| h.transaction()).collect();

    h.service.propose(txs).await.unwrap();

    match h.broadcaster.take().first() {
        Some(ConsensusMessage::PrePrepare(pp)) => assert_eq!(pp.block.transactions.len(), 2),
        other => panic!("expected PrePrepare, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_primary_replaced_after_timeout() {
    let h = harness(1);
    h.service.note_pending_work();

    tokio::time::advance(Duration::from_millis(1_999)).await;
    h.service.tick().await;
    assert!(h.broadcaster.take().is_empty());

    tokio::time::advance(Duration::from_millis(2)).await;
    h.service.tick().await;
    match h.broadcaster.take().as_slice() {
        [ConsensusMessage::ViewChange(vc)] => assert_eq!(vc.new_view, 1),
        other => panic!("expected one ViewChange, got {other:?}"),
    }
    assert!(h.service.status().view_changing);

    for from in [2, 3] {
        h.deliver(h.view_change(from, 1)).await.unwrap();
    }

    let status = h.service.status();
    assert_eq!(status.view, 1);
    assert_eq!(status.primary, NodeId::new("Node2"));
    assert!(h.service.is_primary());
}

#[tokio::test(start_paused = true)]
async fn test_expired_view_change_escalates() {
    let h = harness(1);
    h.service.note_pending_work();

    tokio::time::advance(Duration::from_millis(2_001)).await;
    h.service.tick().await;
    tokio::time::advance(Duration::from_millis(2_001)).await;
    h.service.tick().await;

    let targets: Vec<u64> = h
        .broadcaster
        .take()
        .into_iter()
        .filter_map(|m| match m {
            ConsensusMessage::ViewChange(vc) => Some(vc.new_view),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![1, 2]);
    assert_eq!(h.service.current_view(), 0);
}

#[tokio::test]
async fn test_phase_messages_rejected_while_view_changing() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    let mut bad = pp.clone();
    bad.block.timestamp += 1;
    let _ = h.deliver(ConsensusMessage::PrePrepare(bad)).await;

    let result = h.deliver(ConsensusMessage::PrePrepare(pp)).await;

    assert_eq!(result, Err(ConsensusError::ViewChangeInProgress { view: 0 }));
}

#[tokio::test]
async fn test_new_primary_reproposes_prepared_block() {
    let h = harness(1);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    for from in [0, 2] {
        h.deliver(h.prepare(from, &pp)).await.unwrap();
    }
    h.broadcaster.take();

    for from in [2, 3] {
        h.deliver(h.view_change(from, 1)).await.unwrap();
    }

    let sent = h.broadcaster.take();
    let own_vote = sent.iter().find_map(|m| match m {
        ConsensusMessage::ViewChange(vc) => Some(vc),
        _ => None,
    });
    assert_eq!(own_vote.unwrap().prepared.len(), 1);

    let reproposal = sent.iter().find_map(|m| match m {
        ConsensusMessage::PrePrepare(p) => Some(p),
        _ => None,
    });
    let reproposal = reproposal.expect("new primary re-proposes");
    assert_eq!((reproposal.view, reproposal.sequence), (1, 1));
    assert_eq!(reproposal.digest, pp.digest);

    let fresh = h.service.propose(vec![h.transaction()]).await;
    assert_eq!(fresh, Err(ConsensusError::ProposalInFlight(1)));
}

#[tokio::test]
async fn test_view_change_with_forged_proof_rejected() {
    let h = harness(1);
    let block = h.block(0, 1, h.ledger.tail().hash);
    let digest = block.hash();
    let (id, kp) = &h.keys[2];
    let proof = PreparedProof {
        view: 0,
        sequence: 1,
        digest,
        block,
        prepares: vec![Prepare::new(0, 1, digest, id.clone(), kp)],
    };
    let vote = ViewChange::new(1, id.clone(), 0, vec![proof], kp);

    let result = h.deliver(ConsensusMessage::ViewChange(vote)).await;

    assert!(matches!(result, Err(ConsensusError::InvalidProof { sequence: 1, .. })));
}

#[tokio::test]
async fn test_stable_checkpoint_collects_log() {
    let config = ConsensusConfig {
        checkpoint_interval: 1,
        ..ConsensusConfig::default()
    };
    let h = harness_with(1, config);
    let pp = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    for from in [0, 2] {
        h.deliver(h.prepare(from, &pp)).await.unwrap();
    }
    for from in [0, 2] {
        h.deliver(h.commit(from, &pp)).await.unwrap();
    }
    assert!(kinds(&h.broadcaster.take()).contains(&"checkpoint"));
    assert_eq!(h.service.status().log_entries, 1);

    for from in [0, 2] {
        let (id, kp) = &h.keys[from];
        let checkpoint = Checkpoint::new(1, pp.digest, id.clone(), kp);
        h.deliver(ConsensusMessage::Checkpoint(checkpoint)).await.unwrap();
    }

    let status = h.service.status();
    assert_eq!(status.stable_checkpoint, 1);
    assert_eq!(status.log_entries, 0);

    let (id, kp) = &h.keys[3];
    let late = Checkpoint::new(1, pp.digest, id.clone(), kp);
    let result = h.deliver(ConsensusMessage::Checkpoint(late)).await;
    assert!(matches!(result, Err(ConsensusError::StaleMessage { sequence: 1, .. })));
}

/// Drive `pp` through a full Prepare and Commit quorum from Node1 and Node3.
async fn commit_through(h: &Harness, pp: &PrePrepare) {
    h.deliver(ConsensusMessage::PrePrepare(pp.clone())).await.unwrap();
    for from in [0, 2] {
        h.deliver(h.prepare(from, pp)).await.unwrap();
    }
    for from in [0, 2] {
        h.deliver(h.commit(from, pp)).await.unwrap();
    }
}

fn occurrences(h: &Harness, hash: &Hash) -> usize {
    h.ledger
        .ledger
        .lock()
        .blocks()
        .iter()
        .flat_map(|block| block.transaction_hashes())
        .filter(|committed| committed == hash)
        .count()
}

#[tokio::test]
async fn test_pre_prepare_replaying_committed_transaction_rejected() {
    let h = harness(1);
    let first = h.pre_prepare(0, h.block(0, 1, h.ledger.tail().hash));
    commit_through(&h, &first).await;
    assert_eq!(h.height(), 1);
    let replayed = first.block.transactions[0].clone();

    let block = Block::new(2, h.ledger.tail().hash, vec![replayed.clone()], 2, h.keys[0].0.clone());
    let second = h.pre_prepare(0, block);
    let result = h.deliver(ConsensusMessage::PrePrepare(second.clone())).await;

    assert!(matches!(result, Err(ConsensusError::InvalidProposal { sequence: 2, .. })));
    for from in [0, 2] {
        let _ = h.deliver(h.prepare(from, &second)).await;
        let _ = h.deliver(h.commit(from, &second)).await;
    }
    assert_eq!(h.height(), 1);
    assert_eq!(occurrences(&h, &replayed.hash), 1);
}

#[tokio::test]
async fn test_pre_prepare_repeating_transaction_in_block_rejected() {
    let h = harness(1);
    let tx = h.transaction();
    let block = Block::new(1, h.ledger.tail().hash, vec![tx.clone(), tx], 1, h.keys[0].0.clone());

    let result = h.deliver(ConsensusMessage::PrePrepare(h.pre_prepare(0, block))).await;

    assert!(matches!(result, Err(ConsensusError::InvalidProposal { sequence: 1, .. })));
    assert_eq!(h.height(), 0);
}

#[tokio::test]
async fn test_primary_skips_committed_and_repeated_transactions() {
    let h = harness(0);
    let tx = h.transaction();
    h.service.propose(vec![tx.clone(), tx.clone()]).await.unwrap();
    let pp = match h.broadcaster.take().first() {
        Some(ConsensusMessage::PrePrepare(pp)) => pp.clone(),
        other => panic!("expected PrePrepare, got {other:?}"),
    };
    assert_eq!(pp.block.transactions, vec![tx.clone()]);

    for from in [1, 2] {
        h.deliver(h.prepare(from, &pp)).await.unwrap();
    }
    for from in [1, 2] {
        h.deliver(h.commit(from, &pp)).await.unwrap();
    }
    assert_eq!(h.height(), 1);

    let again = h.service.propose(vec![tx.clone()]).await;

    assert_eq!(again, Err(ConsensusError::EmptyBatch));
    assert_eq!(occurrences(&h, &tx.hash), 1);
}

#[tokio::test]
async fn test_view_change_votes_bounded_per_replica() {
    let h = harness(1);

    for new_view in 2..=50 {
        let _ = h.deliver(h.view_change(3, new_view)).await;
    }

    {
        let votes = h.service.state.view_changes.lock();
        assert_eq!(votes.len(), 1);
        assert!(votes.get(&50).is_some_and(|by_replica| by_replica.len() == 1));
    }
    assert_eq!(h.service.current_view(), 0);

    // A lower vote from the same replica does not displace its latest one
    h.deliver(h.view_change(3, 7)).await.unwrap();
    assert!(!h.service.state.view_changes.lock().contains_key(&7));

    // Honest replicas still reach view 1
    for from in [0, 2] {
        h.deliver(h.view_change(from, 1)).await.unwrap();
    }
    assert_eq!(h.service.current_view(), 1);
}
