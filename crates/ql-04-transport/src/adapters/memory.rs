//! In-memory transport for single-process clusters and tests.
//!
//! A `MemoryNetwork` hub routes payloads between endpoints by address.
//! `disconnect` cuts an address off in both directions until `reconnect`.

use crate::domain::TransportError;
use crate::ports::{PayloadHandler, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Default)]
struct Hub {
    endpoints: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    disconnected: HashSet<String>,
}

/// Shared routing table of every in-memory endpoint.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose outbound payloads originate from `local`.
    pub fn transport(&self, local: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            local: local.into(),
            network: self.clone(),
        }
    }

    /// Drop all traffic to and from `address`.
    pub fn disconnect(&self, address: &str) {
        self.hub.lock().disconnected.insert(address.to_string());
        info!(%address, "Endpoint disconnected");
    }

    pub fn reconnect(&self, address: &str) {
        self.hub.lock().disconnected.remove(address);
        info!(%address, "Endpoint reconnected");
    }

    pub fn is_connected(&self, address: &str) -> bool {
        !self.hub.lock().disconnected.contains(address)
    }

    /// Whether a live listener is registered at `address`.
    pub fn is_listening(&self, address: &str) -> bool {
        self.hub
            .lock()
            .endpoints
            .get(address)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn route(&self, from: &str, to: &str, payload: &[u8]) -> Result<(), TransportError> {
        let hub = self.hub.lock();
        if hub.disconnected.contains(from) || hub.disconnected.contains(to) {
            return Err(TransportError::unreachable(to, "disconnected"));
        }
        let endpoint = hub
            .endpoints
            .get(to)
            .ok_or_else(|| TransportError::unreachable(to, "no listener"))?;
        endpoint
            .send(payload.to_vec())
            .map_err(|_| TransportError::unreachable(to, "listener closed"))
    }

    fn register(&self, address: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError> {
        let mut hub = self.hub.lock();
        if hub.endpoints.get(address).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::AddressInUse(address.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        hub.endpoints.insert(address.to_string(), tx);
        Ok(rx)
    }
}

/// One node's view of a `MemoryNetwork`.
#[derive(Clone)]
pub struct MemoryTransport {
    local: String,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_address(&self) -> &str {
        &self.local
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8], address: &str) -> Result<(), TransportError> {
        self.network.route(&self.local, address, payload)
    }

    async fn listen(
        &self,
        address: &str,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<(), TransportError> {
        let mut inbox = self.network.register(address)?;
        debug!(%address, "Memory endpoint listening");
        while let Some(payload) = inbox.recv().await {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle(payload).await });
        }
        Ok(())
    }
}
