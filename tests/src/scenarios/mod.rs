//! Cluster scenarios.

mod byzantine;
mod checkpoints;
mod e2e;
mod tcp;
