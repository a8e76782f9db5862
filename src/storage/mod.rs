//! Durable run state.
//!
//! Holds the checkpoint snapshot written on interrupt and consumed on resume.

mod checkpoint;

pub use checkpoint::{CheckpointSnapshot, CHECKPOINT_VERSION};
