//! Domain layer for the consensus engine.
//!
//! Pure protocol values: signed messages, the per-(view, sequence) log
//! entry, validator quorum arithmetic and checkpoint tracking.

mod checkpoint;
mod config;
mod error;
mod log;
mod messages;
mod validator;

pub use checkpoint::*;
pub use config::*;
pub use error::*;
pub use log::*;
pub use messages::*;
pub use validator::*;
