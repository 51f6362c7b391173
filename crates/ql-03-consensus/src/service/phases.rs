//! Normal-case operation: propose, pre-prepare, prepare, commit and ordered append.

use super::{ConsensusService, Effects};
use crate::domain::{
    Commit, ConsensusError, ConsensusMessage, ConsensusResult, LogEntry, PrePrepare,
    PrePrepareOutcome, Prepare, Progress,
};
use crate::metrics;
use crate::ports::{Broadcaster, LedgerPort, LedgerTail};
use crate::state::ViewState;
use ql_01_ledger::{Block, Transaction};
use shared_types::{now_millis, short_hex};
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a three-phase message belongs relative to the local view.
pub(super) enum Admission {
    Current(LedgerTail),
    Future,
}

impl<B, L> ConsensusService<B, L>
where
    B: Broadcaster,
    L: LedgerPort,
{
    /// Build and record the next block as primary.
    pub(super) fn start_proposal(
        &self,
        transactions: Vec<Transaction>,
    ) -> ConsensusResult<(u64, Effects)> {
        let vs = self.state.view.read();
        let view = vs.view;
        let primary = self.validators.primary(view);
        if primary != &self.node_id {
            return Err(ConsensusError::NotPrimary {
                view,
                expected: primary.clone(),
                actual: self.node_id.clone(),
            });
        }
        if vs.view_changing {
            return Err(ConsensusError::ViewChangeInProgress { view });
        }

        let tail = self.ledger.tail();
        let in_flight = *self.state.in_flight.lock();
        if let Some(sequence) = in_flight.filter(|s| *s > tail.index) {
            return Err(ConsensusError::ProposalInFlight(sequence));
        }

        let offered = transactions.len();
        let mut seen = HashSet::new();
        let mut batch: Vec<Transaction> = transactions
            .into_iter()
            .filter(|tx| tx.verify())
            .filter(|tx| !self.ledger.contains_transaction(&tx.hash))
            .filter(|tx| seen.insert(tx.hash))
            .collect();
        if batch.len() < offered {
            warn!(
                node = %self.node_id,
                dropped = offered - batch.len(),
                "Dropped unverifiable, duplicate or committed transactions from proposal"
            );
        }
        batch.truncate(self.config.max_batch_size);
        if batch.is_empty() {
            return Err(ConsensusError::EmptyBatch);
        }

        let sequence = tail.index + 1;
        let occupied = self
            .state
            .log
            .get((view, sequence))
            .is_some_and(|entry| entry.lock().pre_prepare.is_some());
        if occupied {
            return Err(ConsensusError::ProposalInFlight(sequence));
        }

        let block = Block::new(sequence, tail.hash, batch, now_millis(), self.node_id.clone());
        let pre_prepare = PrePrepare::new(view, block, self.node_id.clone(), &self.keypair);
        *self.state.in_flight.lock() = Some(sequence);
        info!(
            node = %self.node_id,
            view,
            sequence,
            digest = %short_hex(&pre_prepare.digest),
            transactions = pre_prepare.block.transactions.len(),
            "Proposing block"
        );

        let effects = self.record_own_pre_prepare(view, pre_prepare);
        Ok((sequence, effects))
    }

    /// Accept our own PrePrepare, vote Prepare on it and queue both for broadcast.
    pub(super) fn record_own_pre_prepare(&self, view: u64, pre_prepare: PrePrepare) -> Effects {
        let (sequence, digest) = (pre_prepare.sequence, pre_prepare.digest);
        let mut effects = Effects::default();

        let handle = self.state.log.get_or_create((view, sequence));
        let mut entry = handle.lock();
        if entry.accept_pre_prepare(pre_prepare.clone()) != PrePrepareOutcome::Accepted {
            return effects;
        }
        effects.send(ConsensusMessage::PrePrepare(pre_prepare));

        let prepare = Prepare::new(view, sequence, digest, self.node_id.clone(), &self.keypair);
        entry.add_prepare(prepare.clone());
        effects.send(ConsensusMessage::Prepare(prepare));

        let committed = self.advance_entry(&mut entry, &mut effects);
        drop(entry);

        self.arm_deadline_if_idle();
        if let Some(block) = committed {
            effects.extend(self.enqueue_committed(view, block));
        }
        effects
    }

    /// Drive an entry through as many phases as its votes allow.
    ///
    /// Reaching Prepared records and sends the local Commit.
    fn advance_entry(&self, entry: &mut LogEntry, effects: &mut Effects) -> Option<Block> {
        let quorum = self.validators.quorum();
        loop {
            match entry.advance(quorum) {
                Progress::None => return None,
                Progress::Prepared => {
                    let digest = entry.digest()?;
                    debug!(
                        node = %self.node_id,
                        view = entry.view,
                        sequence = entry.sequence,
                        "Prepared"
                    );
                    let commit = Commit::new(
                        entry.view,
                        entry.sequence,
                        digest,
                        self.node_id.clone(),
                        &self.keypair,
                    );
                    entry.add_commit(commit.clone());
                    effects.send(ConsensusMessage::Commit(commit));
                }
                Progress::Committed(block) => return Some(block),
            }
        }
    }

    /// Classify a three-phase message against the view and the sequence window.
    pub(super) fn admit(
        &self,
        vs: &ViewState,
        view: u64,
        sequence: u64,
    ) -> ConsensusResult<Admission> {
        let tail = self.ledger.tail();
        if view < vs.view || sequence <= tail.index {
            return Err(ConsensusError::StaleMessage { view, sequence });
        }
        if view > vs.view {
            return Ok(Admission::Future);
        }
        if vs.view_changing {
            return Err(ConsensusError::ViewChangeInProgress { view: vs.view });
        }
        let high = tail.index + self.config.sequence_window();
        if sequence > high {
            return Err(ConsensusError::OutOfWindow { sequence, high });
        }
        Ok(Admission::Current(tail))
    }

    pub(super) fn on_pre_prepare(&self, pre_prepare: PrePrepare) -> ConsensusResult<Effects> {
        let key = self.validators.require(&pre_prepare.primary)?;
        if !pre_prepare.verify_signature(key) {
            return Err(ConsensusError::InvalidSignature {
                kind: "preprepare",
                replica: pre_prepare.primary.clone(),
            });
        }

        let vs = self.state.view.read();
        let tail = match self.admit(&vs, pre_prepare.view, pre_prepare.sequence)? {
            Admission::Current(tail) => tail,
            Admission::Future => {
                self.buffer_future(ConsensusMessage::PrePrepare(pre_prepare));
                return Ok(Effects::default());
            }
        };

        let (view, sequence, digest) = (pre_prepare.view, pre_prepare.sequence, pre_prepare.digest);
        let expected = self.validators.primary(view);
        if &pre_prepare.primary != expected {
            return Err(ConsensusError::NotPrimary {
                view,
                expected: expected.clone(),
                actual: pre_prepare.primary.clone(),
            });
        }
        self.validate_proposal(&pre_prepare, tail)?;

        let mut effects = Effects::default();
        let handle = self.state.log.get_or_create((view, sequence));
        let mut entry = handle.lock();
        match entry.accept_pre_prepare(pre_prepare) {
            PrePrepareOutcome::Accepted => {}
            PrePrepareOutcome::Duplicate => return Ok(effects),
            PrePrepareOutcome::Conflict => {
                return Err(ConsensusError::Equivocation { view, sequence });
            }
        }
        debug!(node = %self.node_id, view, sequence, digest = %short_hex(&digest), "PrePrepare accepted");

        let prepare = Prepare::new(view, sequence, digest, self.node_id.clone(), &self.keypair);
        entry.add_prepare(prepare.clone());
        effects.send(ConsensusMessage::Prepare(prepare));

        let committed = self.advance_entry(&mut entry, &mut effects);
        drop(entry);

        self.arm_deadline_if_idle();
        if let Some(block) = committed {
            effects.extend(self.enqueue_committed(view, block));
        }
        Ok(effects)
    }

    /// Body checks on a PrePrepare already known to come from the primary.
    fn validate_proposal(&self, pre_prepare: &PrePrepare, tail: LedgerTail) -> ConsensusResult<()> {
        let (view, sequence) = (pre_prepare.view, pre_prepare.sequence);
        let block = &pre_prepare.block;
        if block.hash() != pre_prepare.digest {
            return Err(ConsensusError::DigestMismatch { view, sequence });
        }
        let invalid = |reason: String| ConsensusError::InvalidProposal { sequence, reason };
        if block.index != sequence {
            return Err(invalid(format!("block index {} differs", block.index)));
        }

        // A sequence prepared in an earlier view must be re-proposed unchanged.
        let reproposal = self.state.reproposals.lock().get(&sequence).map(Block::hash);
        match reproposal {
            Some(prepared) if prepared != pre_prepare.digest => {
                return Err(invalid("differs from the prepared block".into()));
            }
            Some(_) => {}
            None if block.proposer != pre_prepare.primary => {
                return Err(invalid(format!("proposer {} is not the primary", block.proposer)));
            }
            None => {}
        }

        if let Some(tx) = block.transactions.iter().find(|tx| !tx.verify()) {
            return Err(invalid(format!("transaction {} does not verify", short_hex(&tx.hash))));
        }
        let mut seen = HashSet::new();
        if let Some(tx) = block.transactions.iter().find(|tx| !seen.insert(tx.hash)) {
            return Err(invalid(format!("transaction {} repeated in block", short_hex(&tx.hash))));
        }
        if let Some(tx) = block
            .transactions
            .iter()
            .find(|tx| self.ledger.contains_transaction(&tx.hash))
        {
            return Err(invalid(format!("transaction {} already committed", short_hex(&tx.hash))));
        }
        if sequence == tail.index + 1 && block.prev_hash != tail.hash {
            return Err(invalid("previous hash does not match the ledger tail".into()));
        }
        Ok(())
    }

    pub(super) fn on_prepare(&self, prepare: Prepare) -> ConsensusResult<Effects> {
        let key = self.validators.require(&prepare.replica)?;
        if !prepare.verify_signature(key) {
            return Err(ConsensusError::InvalidSignature {
                kind: "prepare",
                replica: prepare.replica.clone(),
            });
        }

        let vs = self.state.view.read();
        if let Admission::Future = self.admit(&vs, prepare.view, prepare.sequence)? {
            self.buffer_future(ConsensusMessage::Prepare(prepare));
            return Ok(Effects::default());
        }

        let view = prepare.view;
        let mut effects = Effects::default();
        let handle = self.state.log.get_or_create((view, prepare.sequence));
        let mut entry = handle.lock();
        if !entry.add_prepare(prepare) {
            return Ok(effects);
        }
        let committed = self.advance_entry(&mut entry, &mut effects);
        drop(entry);

        if let Some(block) = committed {
            effects.extend(self.enqueue_committed(view, block));
        }
        Ok(effects)
    }

    pub(super) fn on_commit(&self, commit: Commit) -> ConsensusResult<Effects> {
        let key = self.validators.require(&commit.replica)?;
        if !commit.verify_signature(key) {
            return Err(ConsensusError::InvalidSignature {
                kind: "commit",
                replica: commit.replica.clone(),
            });
        }

        let vs = self.state.view.read();
        if let Admission::Future = self.admit(&vs, commit.view, commit.sequence)? {
            self.buffer_future(ConsensusMessage::Commit(commit));
            return Ok(Effects::default());
        }

        let view = commit.view;
        let mut effects = Effects::default();
        let handle = self.state.log.get_or_create((view, commit.sequence));
        let mut entry = handle.lock();
        if !entry.add_commit(commit) {
            return Ok(effects);
        }
        let committed = self.advance_entry(&mut entry, &mut effects);
        drop(entry);

        if let Some(block) = committed {
            effects.extend(self.enqueue_committed(view, block));
        }
        Ok(effects)
    }

    /// Queue a committed block and append every block that is now contiguous.
    ///
    /// Must be called with no log entry locked.
    pub(super) fn enqueue_committed(&self, view: u64, block: Block) -> Effects {
        let mut effects = Effects::default();
        let sequence = block.index;

        let appended = {
            let mut queue = self.state.commit_queue.lock();
            queue.insert(block.index, block);
            let mut tail = self.ledger.tail();
            *queue = queue.split_off(&(tail.index + 1));

            let mut appended = Vec::new();
            while let Some(next) = queue.remove(&(tail.index + 1)) {
                let (index, hash, transactions) = (next.index, next.hash(), next.transactions.len());
                match self.ledger.append(next) {
                    Ok(()) => {
                        appended.push((index, hash, transactions));
                        tail = LedgerTail { index, hash };
                    }
                    Err(err) => {
                        warn!(
                            node = %self.node_id,
                            sequence = index,
                            error = %err,
                            "Dropping committed block that does not extend the ledger"
                        );
                        break;
                    }
                }
            }
            if appended.is_empty() {
                debug!(node = %self.node_id, sequence, held = queue.len(), "Committed block held for predecessors");
            }
            appended
        };

        let Some(&(last, _, _)) = appended.last() else {
            return effects;
        };

        for (index, hash, transactions) in appended {
            metrics::record_block_committed();
            info!(
                node = %self.node_id,
                view,
                sequence = index,
                digest = %short_hex(&hash),
                transactions,
                "Block appended"
            );
            self.state.reproposals.lock().remove(&index);
            let interval = self.config.checkpoint_interval;
            if interval > 0 && index % interval == 0 {
                effects.extend(self.emit_checkpoint(index, hash));
            }
        }

        {
            let mut in_flight = self.state.in_flight.lock();
            if in_flight.is_some_and(|s| s <= last) {
                *in_flight = None;
            }
        }
        self.reset_deadline(view);
        effects
    }

    /// After progress, keep the timer only while entries of `view` are still undecided.
    fn reset_deadline(&self, view: u64) {
        let tail = self.ledger.tail().index;
        let pending = self.state.log.entries().iter().any(|handle| {
            let entry = handle.lock();
            entry.view == view && entry.sequence > tail && entry.is_pending()
        });
        *self.state.deadline.lock() =
            pending.then(|| Instant::now() + self.config.view_change_timeout());
    }
}
