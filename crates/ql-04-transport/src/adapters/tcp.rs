//! TCP transport.
//!
//! One payload per connection: the sender writes the payload and closes its
//! write half, the receiver reads until EOF. Connect, write and read are each
//! bounded by `io_timeout`.

use crate::domain::TransportError;
use crate::ports::{PayloadHandler, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// TCP transport limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Bound on connect, write and read (ms)
    pub io_timeout_ms: u64,
    /// Largest accepted payload in bytes
    pub max_payload_bytes: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 1_000,
            max_payload_bytes: 4 * 1024 * 1024,
        }
    }
}

impl TcpConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    async fn write_payload(&self, payload: &[u8], address: &str) -> Result<(), TransportError> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|err| TransportError::unreachable(address, err))?;
        stream
            .write_all(payload)
            .await
            .map_err(|err| TransportError::unreachable(address, err))?;
        stream
            .shutdown()
            .await
            .map_err(|err| TransportError::unreachable(address, err))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, payload: &[u8], address: &str) -> Result<(), TransportError> {
        let limit = self.config.max_payload_bytes;
        if payload.len() > limit {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }
        match timeout(self.config.io_timeout(), self.write_payload(payload, address)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::unreachable(address, "timed out")),
        }
    }

    async fn listen(
        &self,
        address: &str,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<(), TransportError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| TransportError::Bind {
                address: address.to_string(),
                source,
            })?;
        info!(%address, "Listening for peers");
        self.serve(&listener, address, handler).await
    }
}

/// Source of inbound connections.
#[async_trait]
trait Accept: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

impl TcpTransport {
    /// Accept connections forever. A failed accept is logged and retried
    /// after `ACCEPT_BACKOFF`; only binding is fatal.
    async fn serve<A: Accept>(
        &self,
        acceptor: &A,
        address: &str,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<(), TransportError> {
        loop {
            let (stream, peer) = match acceptor.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%address, error = %err, "Accept failed, retrying");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let handler = handler.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                match read_payload(stream, &config).await {
                    Ok(payload) if payload.is_empty() => {}
                    Ok(payload) => handler.handle(payload).await,
                    Err(err) => debug!(%peer, error = %err, "Dropped inbound connection"),
                }
            });
        }
    }
}

/// Read one payload up to EOF, enforcing the size limit and the timeout.
async fn read_payload(stream: TcpStream, config: &TcpConfig) -> Result<Vec<u8>, TransportError> {
    let limit = config.max_payload_bytes;
    let mut payload = Vec::new();
    let mut bounded = stream.take(limit as u64 + 1);

    match timeout(config.io_timeout(), bounded.read_to_end(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return Err(TransportError::unreachable("inbound", err)),
        Err(_) => return Err(TransportError::unreachable("inbound", "read timed out")),
    }
    if payload.len() > limit {
        warn!(limit, "Inbound payload too large, dropping");
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            limit,
        });
    }
    Ok(payload)
}
