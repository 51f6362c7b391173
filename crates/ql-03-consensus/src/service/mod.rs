//! Consensus Service - Core protocol logic
//!
//! # Architecture
//! - Handlers run concurrently, one task per inbound message
//! - Each handler decides under locks, releases them, then broadcasts
//! - Committed blocks are appended strictly in sequence order
//! - Byzantine evidence against the primary triggers a view-change vote

mod phases;
mod view_change;

#[cfg(test)]
mod tests;

use crate::domain::{ConsensusConfig, ConsensusMessage, ConsensusResult, ValidatorSet};
use crate::metrics;
use crate::ports::{Broadcaster, ConsensusApi, ConsensusStatus, LedgerPort};
use crate::state::ConsensusState;
use async_trait::async_trait;
use ql_01_ledger::Transaction;
use shared_crypto::Secp256k1KeyPair;
use shared_types::NodeId;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outbound work produced by a handler once its locks are released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Messages to broadcast to every other replica.
    pub broadcast: Vec<ConsensusMessage>,
    /// Buffered messages released by entering a new view.
    pub replay: Vec<ConsensusMessage>,
}

impl Effects {
    pub fn send(&mut self, message: ConsensusMessage) {
        self.broadcast.push(message);
    }

    pub fn extend(&mut self, other: Effects) {
        self.broadcast.extend(other.broadcast);
        self.replay.extend(other.replay);
    }
}

/// Consensus Service
pub struct ConsensusService<B, L>
where
    B: Broadcaster,
    L: LedgerPort,
{
    broadcaster: Arc<B>,
    ledger: Arc<L>,
    validators: ValidatorSet,
    node_id: NodeId,
    keypair: Secp256k1KeyPair,
    state: ConsensusState,
    config: ConsensusConfig,
}

/// Dependencies for ConsensusService
pub struct ConsensusDependencies<B, L> {
    pub broadcaster: Arc<B>,
    pub ledger: Arc<L>,
    pub validators: ValidatorSet,
    pub node_id: NodeId,
    pub keypair: Secp256k1KeyPair,
    pub config: ConsensusConfig,
}

impl<B, L> ConsensusService<B, L>
where
    B: Broadcaster,
    L: LedgerPort,
{
    /// Create a new ConsensusService. The local node must be a validator.
    pub fn new(deps: ConsensusDependencies<B, L>) -> ConsensusResult<Self> {
        deps.validators.require(&deps.node_id)?;
        Ok(Self {
            broadcaster: deps.broadcaster,
            ledger: deps.ledger,
            validators: deps.validators,
            node_id: deps.node_id,
            keypair: deps.keypair,
            state: ConsensusState::new(),
            config: deps.config,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Handle one message and everything it releases.
    async fn dispatch(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        let (effects, result) = self.process_checked(message);
        self.execute(effects).await;
        result
    }

    /// Run a handler; on byzantine evidence, also vote against the primary.
    fn process_checked(&self, message: ConsensusMessage) -> (Effects, ConsensusResult<()>) {
        let kind = message.kind();
        match self.process(message) {
            Ok(effects) => (effects, Ok(())),
            Err(err) => {
                metrics::record_message_rejected(err.label());
                debug!(node = %self.node_id, kind, error = %err, "Message rejected");
                let effects = if err.implicates_primary() {
                    self.vote_against_primary()
                } else {
                    Effects::default()
                };
                (effects, Err(err))
            }
        }
    }

    fn process(&self, message: ConsensusMessage) -> ConsensusResult<Effects> {
        match message {
            ConsensusMessage::PrePrepare(m) => self.on_pre_prepare(m),
            ConsensusMessage::Prepare(m) => self.on_prepare(m),
            ConsensusMessage::Commit(m) => self.on_commit(m),
            ConsensusMessage::ViewChange(m) => self.on_view_change(m),
            ConsensusMessage::Checkpoint(m) => self.on_checkpoint(m),
        }
    }

    /// Broadcast outbound messages and process replayed ones until drained.
    async fn execute(&self, mut effects: Effects) {
        let mut replay = VecDeque::new();
        loop {
            for message in effects.broadcast.drain(..) {
                let kind = message.kind();
                if let Err(reason) = self.broadcaster.broadcast(message).await {
                    warn!(node = %self.node_id, kind, %reason, "Broadcast failed");
                }
            }
            replay.extend(effects.replay.drain(..));

            let Some(message) = replay.pop_front() else {
                break;
            };
            let (next, _result) = self.process_checked(message);
            effects = next;
        }
    }

    fn buffer_future(&self, message: ConsensusMessage) {
        let mut future = self.state.future.lock();
        if future.len() >= self.config.future_buffer_limit {
            future.pop_front();
            warn!(node = %self.node_id, "Future-view buffer full, dropping oldest message");
        }
        debug!(node = %self.node_id, kind = message.kind(), "Buffered future-view message");
        future.push_back(message);
    }

    /// Start the round timer if it is not running.
    fn arm_deadline_if_idle(&self) {
        let mut deadline = self.state.deadline.lock();
        if deadline.is_none() {
            *deadline = Some(Instant::now() + self.config.view_change_timeout());
        }
    }

    fn restart_deadline(&self) {
        *self.state.deadline.lock() = Some(Instant::now() + self.config.view_change_timeout());
    }
}

#[async_trait]
impl<B, L> ConsensusApi for ConsensusService<B, L>
where
    B: Broadcaster + 'static,
    L: LedgerPort + 'static,
{
    async fn propose(&self, transactions: Vec<Transaction>) -> ConsensusResult<u64> {
        let (sequence, effects) = self.start_proposal(transactions)?;
        self.execute(effects).await;
        Ok(sequence)
    }

    async fn handle_message(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        self.dispatch(message).await
    }

    async fn tick(&self) {
        let effects = self.check_timeouts(Instant::now());
        self.execute(effects).await;
    }

    fn note_pending_work(&self) {
        self.arm_deadline_if_idle();
    }

    fn is_primary(&self) -> bool {
        self.validators.primary(self.state.current_view()) == &self.node_id
    }

    fn current_view(&self) -> u64 {
        self.state.current_view()
    }

    fn status(&self) -> ConsensusStatus {
        let view = self.state.view.read().clone();
        ConsensusStatus {
            view: view.view,
            primary: self.validators.primary(view.view).clone(),
            view_changing: view.view_changing,
            last_appended: self.ledger.tail().index,
            stable_checkpoint: self.state.checkpoints.lock().stable_sequence(),
            log_entries: self.state.log.len(),
        }
    }
}
