//! Domain layer: the wire envelope and its errors.

mod error;
mod wire;

pub use error::*;
pub use wire::*;
