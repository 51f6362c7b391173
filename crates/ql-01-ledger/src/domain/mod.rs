//! Domain layer for the ledger.

mod amount;
mod block;
mod certificate;
mod error;
mod ledger;
mod transaction;

pub use amount::*;
pub use block::*;
pub use certificate::*;
pub use error::*;
pub use ledger::*;
pub use transaction::*;
