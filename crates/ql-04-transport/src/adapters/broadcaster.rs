//! Consensus broadcast over any `Transport`.

use crate::domain::WireMessage;
use crate::ports::Transport;
use async_trait::async_trait;
use futures::future::join_all;
use ql_03_consensus::{Broadcaster, ConsensusMessage};
use shared_types::{NodeId, NodeTable};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends every consensus message to each NodeTable peer except the local node.
pub struct PeerBroadcaster<T: Transport> {
    transport: Arc<T>,
    table: NodeTable,
    local: NodeId,
}

impl<T: Transport> PeerBroadcaster<T> {
    pub fn new(transport: Arc<T>, table: NodeTable, local: NodeId) -> Self {
        Self {
            transport,
            table,
            local,
        }
    }

    /// Send an encoded payload to every peer concurrently.
    ///
    /// Returns how many peers accepted it.
    pub async fn send_to_peers(&self, payload: &[u8]) -> usize {
        let sends = self.table.peers(&self.local).map(|(peer, address)| async move {
            match self.transport.send(payload, address).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(node = %self.local, %peer, error = %err, "Send to peer failed");
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }
}

#[async_trait]
impl<T: Transport> Broadcaster for PeerBroadcaster<T> {
    async fn broadcast(&self, message: ConsensusMessage) -> Result<(), String> {
        let kind = message.kind();
        let payload = WireMessage::from(message)
            .encode()
            .map_err(|err| err.to_string())?;

        let peers = self.table.len().saturating_sub(1);
        let delivered = self.send_to_peers(&payload).await;
        debug!(node = %self.local, kind, delivered, peers, "Broadcast");
        if delivered == 0 && peers > 0 {
            return Err(format!("{kind} reached none of {peers} peers"));
        }
        Ok(())
    }
}
