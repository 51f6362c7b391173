//! Adapters layer
//!
//! - `TcpTransport`: one connection per payload, for multi-process clusters
//! - `MemoryTransport`: channel routing with fault injection
//! - `PeerBroadcaster`: the consensus `Broadcaster` port over any transport

mod broadcaster;
mod memory;
mod tcp;

pub use broadcaster::PeerBroadcaster;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::{TcpConfig, TcpTransport};
