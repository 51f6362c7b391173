//! Mutable state of the consensus service.
//!
//! Lock order: `view`, then `log` (map, then entry), then the remaining
//! mutexes. No guard is held across an `.await`.

use crate::domain::{CheckpointTracker, ConsensusMessage, EntryKey, LogEntry, ViewChange};
use parking_lot::{Mutex, RwLock};
use ql_01_ledger::Block;
use shared_types::NodeId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

/// View bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub view: u64,
    /// Voted to leave `view` and waiting for a view-change quorum.
    pub view_changing: bool,
    /// Highest view this node has voted for.
    pub voted_view: u64,
}

/// Arena of log entries keyed by `(view, sequence)`, one mutex per entry.
#[derive(Default)]
pub struct ConsensusLog {
    entries: Mutex<HashMap<EntryKey, Arc<Mutex<LogEntry>>>>,
}

impl ConsensusLog {
    pub fn get(&self, key: EntryKey) -> Option<Arc<Mutex<LogEntry>>> {
        self.entries.lock().get(&key).cloned()
    }

    pub fn get_or_create(&self, key: EntryKey) -> Arc<Mutex<LogEntry>> {
        self.entries
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(LogEntry::new(key.0, key.1))))
            .clone()
    }

    /// Keep only entries for which `keep` returns true.
    pub fn retain(&self, mut keep: impl FnMut(&EntryKey, &LogEntry) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| keep(key, &entry.lock()));
        before - entries.len()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<Arc<Mutex<LogEntry>>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Encapsulates the mutable state of the Consensus Service.
pub struct ConsensusState {
    pub view: RwLock<ViewState>,
    pub log: ConsensusLog,
    /// Committed blocks waiting for their predecessors.
    pub commit_queue: Mutex<BTreeMap<u64, Block>>,
    /// View-change votes by target view; each replica appears under its highest view only.
    pub view_changes: Mutex<BTreeMap<u64, HashMap<NodeId, ViewChange>>>,
    pub checkpoints: Mutex<CheckpointTracker>,
    /// Three-phase messages for views not yet entered.
    pub future: Mutex<VecDeque<ConsensusMessage>>,
    /// Prepared blocks the current view's primary must re-propose.
    pub reproposals: Mutex<BTreeMap<u64, Block>>,
    /// Highest sequence of the primary's own outstanding proposal.
    pub in_flight: Mutex<Option<u64>>,
    /// Round deadline; expiry triggers a view change.
    pub deadline: Mutex<Option<Instant>>,
}

impl ConsensusState {
    pub fn new() -> Self {
        Self {
            view: RwLock::new(ViewState {
                view: 0,
                view_changing: false,
                voted_view: 0,
            }),
            log: ConsensusLog::default(),
            commit_queue: Mutex::new(BTreeMap::new()),
            view_changes: Mutex::new(BTreeMap::new()),
            checkpoints: Mutex::new(CheckpointTracker::new()),
            future: Mutex::new(VecDeque::new()),
            reproposals: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(None),
            deadline: Mutex::new(None),
        }
    }

    pub fn current_view(&self) -> u64 {
        self.view.read().view
    }
}

impl Default for ConsensusState {
    fn default() -> Self {
        Self::new()
    }
}
