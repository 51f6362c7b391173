//! Ports layer
//!
//! - `Transport` is implemented by the TCP and in-memory adapters
//! - `PayloadHandler` is implemented by whoever consumes inbound payloads

use crate::domain::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Consumer of raw inbound payloads.
#[async_trait]
pub trait PayloadHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Vec<u8>);
}

/// Point-to-point delivery of opaque payloads between node addresses.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver one payload to `address`.
    ///
    /// # Errors
    /// `Unreachable` when the peer cannot be reached; `PayloadTooLarge` when
    /// the payload exceeds the adapter's limit.
    async fn send(&self, payload: &[u8], address: &str) -> Result<(), TransportError>;

    /// Accept payloads on `address` until the listener fails.
    ///
    /// Each payload is handed to `handler` on its own task.
    async fn listen(
        &self,
        address: &str,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<(), TransportError>;
}
