//! # Node
//!
//! One replica: ledger, mempool, consensus engine and a transport listener.
//!
//! ```text
//! transport ──payload──→ Node::handle_payload ──decode──┬─ tran ──→ mempool
//!                                                      └─ pbft ──→ consensus
//! ticker ──every tick──→ consensus.tick, propose (primary) or note work (replica)
//! ```
//!
//! Inbound errors are logged and dropped; nothing on the message path stops
//! the node.

use crate::adapters::SharedLedger;
use async_trait::async_trait;
use parking_lot::Mutex;
use ql_01_ledger::{Ledger, Transaction};
use ql_02_mempool::{MempoolConfig, MempoolError, TransactionPool};
use ql_03_consensus::{
    ConsensusApi, ConsensusConfig, ConsensusDependencies, ConsensusError, ConsensusService,
    ConsensusStatus, LedgerPort, ValidatorSet,
};
use ql_04_transport::adapters::PeerBroadcaster;
use ql_04_transport::{PayloadHandler, Transport, TransportError, WireMessage};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{short_hex, DirectoryError, NodeId, NodeTable};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Tunables shared by every node of a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub consensus: ConsensusConfig,
    pub mempool: MempoolConfig,
    pub tick_interval: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            mempool: MempoolConfig::default(),
            tick_interval: Duration::from_millis(100),
        }
    }
}

/// Everything a node is built from.
pub struct NodeDependencies<T> {
    pub id: NodeId,
    pub keypair: Secp256k1KeyPair,
    pub table: NodeTable,
    pub validators: ValidatorSet,
    pub transport: Arc<T>,
    pub settings: NodeSettings,
}

type Engine<T> = ConsensusService<PeerBroadcaster<T>, SharedLedger>;

struct NodeInner<T: Transport> {
    id: NodeId,
    address: String,
    transport: Arc<T>,
    pool: Arc<Mutex<TransactionPool>>,
    ledger: Arc<SharedLedger>,
    consensus: Engine<T>,
    settings: NodeSettings,
}

pub struct Node<T: Transport> {
    inner: Arc<NodeInner<T>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Node<T> {
    /// Build a node with a fresh ledger.
    ///
    /// Genesis is proposed by the first NodeTable member, so every node of
    /// the table starts from the same genesis hash.
    pub fn new(deps: NodeDependencies<T>) -> Result<Self, NodeError> {
        let address = deps.table.address_of(&deps.id)?.to_string();
        let genesis_proposer = deps.table.at_rotation(0).clone();

        let pool = Arc::new(Mutex::new(TransactionPool::new(deps.settings.mempool.clone())));
        let ledger = Arc::new(SharedLedger::new(
            deps.id.clone(),
            Ledger::with_genesis(&genesis_proposer),
            pool.clone(),
        ));
        let broadcaster = Arc::new(PeerBroadcaster::new(
            deps.transport.clone(),
            deps.table,
            deps.id.clone(),
        ));
        let consensus = ConsensusService::new(ConsensusDependencies {
            broadcaster,
            ledger: ledger.clone(),
            validators: deps.validators,
            node_id: deps.id.clone(),
            keypair: deps.keypair,
            config: deps.settings.consensus.clone(),
        })?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(NodeInner {
                id: deps.id,
                address,
                transport: deps.transport,
                pool,
                ledger,
                consensus,
                settings: deps.settings,
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Spawn the listener and ticker tasks.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!(node = %self.inner.id, "Node already started");
            return;
        }
        self.shutdown.send_replace(false);

        let inner = self.inner.clone();
        let mut stop = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let handler: Arc<dyn PayloadHandler> = inner.clone();
            tokio::select! {
                result = inner.transport.listen(&inner.address, handler) => {
                    if let Err(err) = result {
                        error!(node = %inner.id, error = %err, "Listener stopped");
                    }
                }
                _ = stop.changed() => {}
            }
        }));

        let inner = self.inner.clone();
        let mut stop = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(inner.settings.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => inner.on_tick().await,
                    _ = stop.changed() => break,
                }
            }
        }));

        info!(node = %self.inner.id, address = %self.inner.address, "Node started");
    }

    /// Stop both tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(node = %self.inner.id, error = %err, "Node task ended abnormally");
            }
        }
        info!(node = %self.inner.id, height = self.height(), "Node stopped");
    }

    /// Decode and route one inbound payload.
    pub async fn handle_payload(&self, payload: &[u8]) {
        self.inner.route(payload).await;
    }

    /// One ticker step.
    pub async fn tick(&self) {
        self.inner.on_tick().await;
    }

    pub fn height(&self) -> u64 {
        self.inner.ledger.height()
    }

    pub fn ledger(&self) -> Ledger {
        self.inner.ledger.snapshot()
    }

    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        self.inner.ledger.with(f)
    }

    pub fn pool_len(&self) -> usize {
        self.inner.pool.lock().len()
    }

    pub fn status(&self) -> ConsensusStatus {
        self.inner.consensus.status()
    }

    pub fn consensus(&self) -> &impl ConsensusApi {
        &self.inner.consensus
    }
}

impl<T: Transport> NodeInner<T> {
    async fn route(&self, payload: &[u8]) {
        let message = match WireMessage::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(node = %self.id, error = %err, "Dropping undecodable payload");
                return;
            }
        };
        match message {
            WireMessage::Transaction(tx) => self.accept_transaction(tx),
            WireMessage::Consensus(message) => {
                let kind = message.kind();
                if let Err(err) = self.consensus.handle_message(message).await {
                    debug!(node = %self.id, kind, error = %err, "Consensus message dropped");
                }
            }
        }
    }

    fn accept_transaction(&self, tx: Transaction) {
        let hash = tx.hash;
        if self.ledger.contains_transaction(&hash) {
            debug!(node = %self.id, tx = %short_hex(&hash), "Transaction already on ledger, ignored");
            return;
        }
        match self.pool.lock().add(tx) {
            Ok(outcome) => {
                debug!(
                    node = %self.id,
                    tx = %short_hex(&hash),
                    pool_size = outcome.pool_size,
                    "Transaction accepted"
                );
            }
            Err(err @ (MempoolError::Duplicate(_) | MempoolError::AlreadyCommitted(_))) => {
                debug!(node = %self.id, error = %err, "Transaction ignored");
            }
            Err(err) => warn!(node = %self.id, error = %err, "Transaction rejected"),
        }
    }

    async fn on_tick(&self) {
        self.consensus.tick().await;

        if self.pool.lock().is_empty() {
            return;
        }
        if !self.consensus.is_primary() {
            self.consensus.note_pending_work();
            return;
        }

        let batch = self
            .pool
            .lock()
            .select_batch(self.settings.consensus.max_batch_size);
        match self.consensus.propose(batch).await {
            Ok(sequence) => debug!(node = %self.id, sequence, "Proposed batch"),
            Err(ConsensusError::ProposalInFlight(_) | ConsensusError::ViewChangeInProgress { .. }) => {}
            Err(err) => warn!(node = %self.id, error = %err, "Proposal failed"),
        }
    }
}

#[async_trait]
impl<T: Transport> PayloadHandler for NodeInner<T> {
    async fn handle(&self, payload: Vec<u8>) {
        self.route(&payload).await;
    }
}
