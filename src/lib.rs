//! # portrunner - a resumable, high-concurrency TCP port prober
//!
//! portrunner probes every host × port combination of a target set with a
//! fixed pool of workers, streams one record per probe to a result file,
//! and on interruption saves the targets it has not reached to a
//! checkpoint that a later run picks up.
//!
//! ## Features
//!
//! - **Probe strategies**: TCP connect, raw SYN, and a dry run that sends nothing
//! - **Bounded dispatch**: a fixed-capacity task queue between producer and workers
//! - **Streaming output**: CSV or JSON Lines, one flushed record per result
//! - **Checkpoint/resume**: Ctrl-C saves the undispatched targets
//! - **Ping prefilter**: unreachable hosts are dropped before probing
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use portrunner::engine::{run_scan, ScanJob};
//! use portrunner::output::{OutputFormat, Reporter};
//! use portrunner::scanner::{create_probers, ScanType};
//! use portrunner::types::Target;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let probers = create_probers(ScanType::Connect, false, 4, Duration::from_millis(200), 10000)?;
//!     let job = ScanJob {
//!         targets: vec![Target::new("127.0.0.1", 22), Target::new("127.0.0.1", 80)],
//!         probers,
//!         queue_capacity: 64,
//!         delay: Duration::ZERO,
//!         rate: None,
//!         checkpoint_path: "checkpoint.json".into(),
//!     };
//!     let reporter = Reporter::create("results.csv".as_ref(), OutputFormat::Csv, false)?;
//!     let report = run_scan(job, reporter, CancellationToken::new()).await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Ports, host specs and scan targets
//! - [`scanner`] - Probe strategies, the `Prober` trait and ICMP pingers
//! - [`engine`] - Task queue, worker pool, prefilter and the run orchestrator
//! - [`storage`] - Checkpoint snapshots
//! - [`output`] - Result sinks, the reporter and console messages
//! - [`config`] - Settings file and per-run configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Error types per layer

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod scanner;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use engine::{run_scan, ScanJob, ScanReport};
pub use error::{CliError, EngineError, ScanError};
pub use scanner::{ProbeOutcome, ProbeResult, Prober, ScanType};
pub use storage::CheckpointSnapshot;
pub use types::{Port, PortSpec, Target};
