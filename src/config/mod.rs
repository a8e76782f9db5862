//! Configuration management for portrunner.
//!
//! XDG-located settings file plus the merge of command-line values over it.

mod settings;

pub use settings::{Paths, RunConfig, RunOverrides, Settings, QUEUE_SLOTS_PER_WORKER};
