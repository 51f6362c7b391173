//! View change, round timer and checkpoints.
//!
//! A ViewChange quorum is applied directly by every replica: each one
//! derives the sequences to re-propose from the proofs it received, and the
//! new primary re-proposes them before fresh batches.

use super::{ConsensusService, Effects};
use crate::domain::{
    Checkpoint, ConsensusError, ConsensusMessage, ConsensusResult, EntryStatus, PrePrepare,
    PreparedProof, ViewChange,
};
use crate::metrics;
use crate::ports::{Broadcaster, LedgerPort};
use crate::state::ViewState;
use ql_01_ledger::Block;
use shared_types::{short_hex, Hash, NodeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl<B, L> ConsensusService<B, L>
where
    B: Broadcaster,
    L: LedgerPort,
{
    /// Start or escalate a view change if the round timer expired.
    pub(super) fn check_timeouts(&self, now: Instant) -> Effects {
        let expired = self.state.deadline.lock().is_some_and(|deadline| now >= deadline);
        if !expired {
            return Effects::default();
        }

        let mut vs = self.state.view.write();
        *self.state.deadline.lock() = None;
        let timeout = ConsensusError::QuorumTimeout { view: vs.view };
        warn!(node = %self.node_id, view = vs.view, error = %timeout, "Round timer expired");

        let target = if vs.view_changing {
            vs.voted_view + 1
        } else {
            vs.view + 1
        };
        self.start_view_change_locked(&mut vs, target)
    }

    /// Vote to replace the current primary.
    pub(super) fn vote_against_primary(&self) -> Effects {
        let mut vs = self.state.view.write();
        let target = vs.view + 1;
        self.start_view_change_locked(&mut vs, target)
    }

    fn start_view_change_locked(&self, vs: &mut ViewState, new_view: u64) -> Effects {
        let mut effects = Effects::default();
        if new_view <= vs.view.max(vs.voted_view) {
            return effects;
        }
        vs.view_changing = true;
        vs.voted_view = new_view;

        let tail = self.ledger.tail();
        let prepared = self.prepared_proofs(tail.index);
        info!(
            node = %self.node_id,
            view = vs.view,
            new_view,
            prepared = prepared.len(),
            "Starting view change"
        );
        let vote = ViewChange::new(
            new_view,
            self.node_id.clone(),
            tail.index,
            prepared,
            &self.keypair,
        );
        self.restart_deadline();
        effects.send(ConsensusMessage::ViewChange(vote.clone()));

        if self.record_view_change_vote(vote) >= self.validators.quorum() {
            effects.extend(self.advance_view_locked(vs, new_view));
        }
        effects
    }

    /// Highest-view prepared proof for every sequence above `tail`.
    fn prepared_proofs(&self, tail: u64) -> Vec<PreparedProof> {
        let mut best: BTreeMap<u64, PreparedProof> = BTreeMap::new();
        for handle in self.state.log.entries() {
            let entry = handle.lock();
            if entry.sequence <= tail {
                continue;
            }
            let Some(proof) = entry.prepared_proof() else {
                continue;
            };
            match best.get(&proof.sequence) {
                Some(existing) if existing.view >= proof.view => {}
                _ => {
                    best.insert(proof.sequence, proof);
                }
            }
        }
        best.into_values().collect()
    }

    /// Store a vote; returns the vote count for its view.
    ///
    /// Only each replica's highest target view is kept (first vote wins
    /// within a view), so at most one vote per validator is held.
    fn record_view_change_vote(&self, vote: ViewChange) -> usize {
        let new_view = vote.new_view;
        let mut votes = self.state.view_changes.lock();
        let superseded = votes
            .range((Bound::Excluded(new_view), Bound::Unbounded))
            .any(|(_, by_replica)| by_replica.contains_key(&vote.replica));
        if superseded {
            debug!(node = %self.node_id, replica = %vote.replica, new_view, "Ignoring ViewChange below replica's latest");
        } else {
            for (_, by_replica) in votes.range_mut(..new_view) {
                by_replica.remove(&vote.replica);
            }
            votes.retain(|_, by_replica| !by_replica.is_empty());
            votes
                .entry(new_view)
                .or_default()
                .entry(vote.replica.clone())
                .or_insert(vote);
        }
        votes.get(&new_view).map_or(0, HashMap::len)
    }

    pub(super) fn on_view_change(&self, vote: ViewChange) -> ConsensusResult<Effects> {
        let key = self.validators.require(&vote.replica)?;
        if !vote.verify_signature(key) {
            return Err(ConsensusError::InvalidSignature {
                kind: "viewchange",
                replica: vote.replica.clone(),
            });
        }
        if let Some(proof) = vote.prepared.iter().find(|p| !self.validate_proof(p)) {
            return Err(ConsensusError::InvalidProof {
                replica: vote.replica.clone(),
                sequence: proof.sequence,
            });
        }

        let mut vs = self.state.view.write();
        let new_view = vote.new_view;
        if new_view <= vs.view {
            return Err(ConsensusError::StaleMessage {
                view: new_view,
                sequence: vote.last_sequence,
            });
        }

        let replica = vote.replica.clone();
        let count = self.record_view_change_vote(vote);
        debug!(node = %self.node_id, %replica, new_view, votes = count, "ViewChange recorded");

        if count >= self.validators.weak_quorum() && vs.voted_view < new_view {
            Ok(self.start_view_change_locked(&mut vs, new_view))
        } else if count >= self.validators.quorum() {
            Ok(self.advance_view_locked(&mut vs, new_view))
        } else {
            Ok(Effects::default())
        }
    }

    /// A proof is a block matching its digest plus a Prepare quorum over it.
    fn validate_proof(&self, proof: &PreparedProof) -> bool {
        if proof.block.hash() != proof.digest || proof.block.index != proof.sequence {
            return false;
        }
        let signers: HashSet<&NodeId> = proof
            .prepares
            .iter()
            .filter(|p| {
                p.view == proof.view && p.sequence == proof.sequence && p.digest == proof.digest
            })
            .filter(|p| {
                self.validators
                    .public_key(&p.replica)
                    .is_some_and(|key| p.verify_signature(key))
            })
            .map(|p| &p.replica)
            .collect();
        signers.len() >= self.validators.quorum()
    }

    fn advance_view_locked(&self, vs: &mut ViewState, new_view: u64) -> Effects {
        let mut effects = Effects::default();
        vs.view = new_view;
        vs.view_changing = false;
        vs.voted_view = vs.voted_view.max(new_view);

        let votes = {
            let mut all = self.state.view_changes.lock();
            let votes = all.remove(&new_view).unwrap_or_default();
            *all = all.split_off(&(new_view + 1));
            votes
        };

        let tail = self.ledger.tail().index;
        let mut reproposals: BTreeMap<u64, (u64, Block)> = BTreeMap::new();
        for proof in votes.into_values().flat_map(|vote| vote.prepared) {
            if proof.sequence <= tail {
                continue;
            }
            match reproposals.get(&proof.sequence) {
                Some((view, _)) if *view >= proof.view => {}
                _ => {
                    reproposals.insert(proof.sequence, (proof.view, proof.block));
                }
            }
        }
        let reproposals: BTreeMap<u64, Block> = reproposals
            .into_iter()
            .map(|(sequence, (_, block))| (sequence, block))
            .collect();

        let discarded = self.state.log.retain(|&(view, _), entry| {
            view >= new_view || entry.status == EntryStatus::Committed
        });
        *self.state.in_flight.lock() = None;
        *self.state.reproposals.lock() = reproposals.clone();
        *self.state.deadline.lock() = None;

        metrics::record_view_change(new_view);
        let primary = self.validators.primary(new_view);
        info!(
            node = %self.node_id,
            view = new_view,
            %primary,
            discarded,
            reproposals = reproposals.len(),
            "Entered new view"
        );

        if primary == &self.node_id {
            for block in reproposals.values() {
                debug!(node = %self.node_id, view = new_view, sequence = block.index, "Re-proposing prepared block");
                let pre_prepare =
                    PrePrepare::new(new_view, block.clone(), self.node_id.clone(), &self.keypair);
                effects.extend(self.record_own_pre_prepare(new_view, pre_prepare));
            }
            let last = reproposals.keys().next_back().copied().filter(|s| *s > self.ledger.tail().index);
            *self.state.in_flight.lock() = last;
        }
        if !reproposals.is_empty() {
            self.arm_deadline_if_idle();
        }

        let mut future = self.state.future.lock();
        let buffered = std::mem::take(&mut *future);
        for message in buffered {
            match message.phase_view() {
                Some(view) if view == new_view => effects.replay.push(message),
                Some(view) if view > new_view => future.push_back(message),
                _ => {}
            }
        }
        effects
    }

    /// Announce an appended checkpoint block and count our own vote.
    pub(super) fn emit_checkpoint(&self, sequence: u64, block_hash: Hash) -> Effects {
        let mut effects = Effects::default();
        let checkpoint = Checkpoint::new(sequence, block_hash, self.node_id.clone(), &self.keypair);
        let stable = self.state.checkpoints.lock().record(
            sequence,
            self.node_id.clone(),
            block_hash,
            self.validators.quorum(),
        );
        if let Some((stable, hash)) = stable {
            self.collect_garbage(stable, &hash);
        }
        effects.send(ConsensusMessage::Checkpoint(checkpoint));
        effects
    }

    pub(super) fn on_checkpoint(&self, checkpoint: Checkpoint) -> ConsensusResult<Effects> {
        let key = self.validators.require(&checkpoint.replica)?;
        if !checkpoint.verify_signature(key) {
            return Err(ConsensusError::InvalidSignature {
                kind: "checkpoint",
                replica: checkpoint.replica.clone(),
            });
        }

        let view = self.state.current_view();
        let stable = {
            let mut tracker = self.state.checkpoints.lock();
            if checkpoint.sequence <= tracker.stable_sequence() {
                return Err(ConsensusError::StaleMessage {
                    view,
                    sequence: checkpoint.sequence,
                });
            }
            tracker.record(
                checkpoint.sequence,
                checkpoint.replica,
                checkpoint.block_hash,
                self.validators.quorum(),
            )
        };
        if let Some((stable, hash)) = stable {
            self.collect_garbage(stable, &hash);
        }
        Ok(Effects::default())
    }

    /// Drop log entries and view-change proofs at or below a stable checkpoint.
    fn collect_garbage(&self, stable: u64, hash: &Hash) {
        let removed = self.state.log.retain(|&(_, sequence), _| sequence > stable);
        {
            let mut votes = self.state.view_changes.lock();
            for vote in votes.values_mut().flat_map(|by_replica| by_replica.values_mut()) {
                vote.prepared.retain(|proof| proof.sequence > stable);
            }
        }
        info!(
            node = %self.node_id,
            sequence = stable,
            digest = %short_hex(hash),
            removed,
            "Checkpoint stable"
        );
    }
}
