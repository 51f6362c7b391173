//! # ql-04-transport
//!
//! Peer-to-peer messaging for Quorum-Ledger nodes.
//!
//! ## Wire Format
//!
//! | Tag | Body |
//! |-----|------|
//! | `tran` | signed `Transaction` |
//! | `preprepare` | `PrePrepare` |
//! | `prepare` | `Prepare` |
//! | `commit` | `Commit` |
//! | `viewchange` | `ViewChange` |
//! | `checkpoint` | `Checkpoint` |
//!
//! The tag is followed directly by the JSON body. Unknown tags and
//! malformed bodies are `CodecError`s; the payload is dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let network = MemoryNetwork::new();
//! let transport = Arc::new(network.transport("127.0.0.1:4001"));
//! let broadcaster = PeerBroadcaster::new(transport.clone(), table, node_id);
//! tokio::spawn(async move { transport.listen("127.0.0.1:4001", handler).await });
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{MemoryNetwork, MemoryTransport, PeerBroadcaster, TcpConfig, TcpTransport};
pub use domain::{CodecError, TransportError, WireMessage};
pub use ports::{PayloadHandler, Transport};
