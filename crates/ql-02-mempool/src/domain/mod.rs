//! Domain layer for the transaction pool.

mod entities;
mod errors;
mod pool;

pub use entities::*;
pub use errors::*;
pub use pool::*;
