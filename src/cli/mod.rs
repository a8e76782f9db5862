//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `portrunner scan --ip <SPEC> --port <SPEC>` - Probe a fresh target set
//! - `portrunner resume <FILE>` - Continue an interrupted run from its checkpoint

mod checks;
mod resume;
mod run;
mod scan;

pub use checks::{is_root, open_file_limit};
pub use resume::ResumeCommand;
pub use run::Context;
pub use scan::ScanCommand;

use crate::config::RunOverrides;
use crate::output::OutputFormat;
use crate::scanner::ScanType;
use clap::{Args, Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// portrunner - a resumable, high-concurrency TCP port prober.
///
/// Probes every host × port combination with a fixed pool of workers,
/// streams each result to disk as it arrives, and on Ctrl-C saves the
/// targets it has not reached yet so the run can be resumed.
#[derive(Parser, Debug)]
#[command(name = "portrunner")]
#[command(author = "HueCodes <huecodes@proton.me>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A resumable, high-concurrency TCP port prober", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a settings file (default: the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL", env = "PORTRUNNER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe hosts and ports
    #[command(alias = "s")]
    Scan(ScanCommand),

    /// Resume an interrupted run from its checkpoint file
    #[command(alias = "r")]
    Resume(ResumeCommand),
}

impl Commands {
    /// Execute the selected subcommand.
    pub async fn execute(&self, ctx: &Context) -> crate::error::CliResult<()> {
        match self {
            Commands::Scan(cmd) => cmd.execute(ctx).await,
            Commands::Resume(cmd) => cmd.execute(ctx).await,
        }
    }
}

/// Options shared by every command that runs probes.
///
/// Anything left unset falls back to the settings file, then to the
/// built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Number of concurrent workers [default: 1]
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Per-probe timeout in milliseconds [default: 100]
    #[arg(short = 't', long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Delay after each probe, per worker, in milliseconds [default: 100]
    #[arg(short = 'd', long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Task queue capacity [default: workers × 1024]
    #[arg(long)]
    pub queue: Option<usize>,

    /// Go through the motions without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Result file [default: results.csv]
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Result file format [default: csv]
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Probe strategy [default: connect]
    #[arg(short = 's', long = "scan-type", value_enum)]
    pub scan_type: Option<ScanType>,

    /// Skip the ping prefilter and probe every host
    #[arg(long)]
    pub no_ping: bool,

    /// Where to save remaining targets on interrupt [default: checkpoint.json]
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// First source port used by syn workers [default: 10000]
    #[arg(long, value_name = "PORT")]
    pub source_port_base: Option<u16>,

    /// Cap on probes per second across all workers, 0 for none [default: 0]
    #[arg(short = 'r', long)]
    pub rate: Option<u32>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,
}

impl From<&RunOptions> for RunOverrides {
    fn from(opts: &RunOptions) -> Self {
        Self {
            workers: opts.workers,
            timeout_ms: opts.timeout,
            delay_ms: opts.delay,
            queue: opts.queue,
            output: opts.output.clone(),
            format: opts.format,
            scan_type: opts.scan_type,
            no_ping: opts.no_ping,
            checkpoint: opts.checkpoint.clone(),
            source_port_base: opts.source_port_base,
            rate: opts.rate,
            dry_run: opts.dry_run,
            progress: opts.progress,
        }
    }
}

/// Exit status when a second signal aborts a shutdown in progress.
const FORCED_EXIT_CODE: i32 = 130;

/// Cancel `cancel` on Ctrl-C or SIGTERM.
///
/// The run then winds down and saves its checkpoint. A second signal exits
/// at once without waiting for in-flight probes.
pub fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(watch_signals(cancel, shutdown_signal, || {
        std::process::exit(FORCED_EXIT_CODE);
    }));
}

/// First signal cancels `cancel`; the next one after that calls `force`.
async fn watch_signals<S, F>(cancel: CancellationToken, mut signal: impl FnMut() -> S, force: F)
where
    S: Future<Output = ()>,
    F: FnOnce(),
{
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = signal() => {
            warn!("shutdown signal received, saving state (repeat to force exit)");
            cancel.cancel();
        }
    }
    signal().await;
    warn!("second shutdown signal received, exiting without saving");
    force();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
