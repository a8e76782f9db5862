//! Scan subcommand implementation.
//!
//! Handles `portrunner scan --ip <SPEC> --port <SPEC>`, optionally picking
//! up a checkpoint first.

use super::run::{self, Context, TargetSource};
use super::RunOptions;
use crate::config::{RunConfig, RunOverrides};
use crate::error::{CliResult, ConfigError};
use crate::output;
use crate::storage::CheckpointSnapshot;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Probe hosts and ports.
#[derive(Parser, Debug)]
pub struct ScanCommand {
    /// Hosts to probe: IPs, CIDR blocks and hostnames, comma-separated, or a file
    ///
    /// Examples:
    ///   192.168.1.1              Single IP address
    ///   192.168.1.0/24           CIDR range
    ///   10.0.0.1,scanme.example  Mixed list
    ///   hosts.txt                One entry per line (.csv: first column)
    #[arg(short = 'i', long, value_name = "SPEC")]
    pub ip: Option<String>,

    /// Ports to probe (e.g., "80", "80,443", "1-1000"), or a file
    #[arg(short = 'p', long, value_name = "SPEC")]
    pub port: Option<String>,

    /// Try this checkpoint first; fall back to --ip/--port if it cannot be used
    #[arg(long, value_name = "FILE")]
    pub resume: Option<PathBuf>,

    #[command(flatten)]
    pub options: RunOptions,
}

impl ScanCommand {
    /// Execute the scan command.
    pub async fn execute(&self, ctx: &Context) -> CliResult<()> {
        let config = RunConfig::resolve(&ctx.settings, &RunOverrides::from(&self.options))?;

        if let Some(path) = &self.resume {
            if let Some(snapshot) = try_resume(path, ctx) {
                let source = TargetSource::Checkpoint {
                    path: path.clone(),
                    snapshot,
                };
                return run::execute(ctx, config, source).await;
            }
        }

        let ip = self.ip.as_deref().ok_or(ConfigError::MissingInput("--ip"))?;
        let port = self.port.as_deref().ok_or(ConfigError::MissingInput("--port"))?;
        info!("starting a new scan");
        let targets = run::enumerate(ip, port, &config, &ctx.cancel).await?;
        run::execute(ctx, config, TargetSource::Fresh(targets)).await
    }
}

/// Opportunistic resume: a checkpoint that cannot be read is logged and
/// means "start fresh".
fn try_resume(path: &Path, ctx: &Context) -> Option<CheckpointSnapshot> {
    match CheckpointSnapshot::load(path) {
        Ok(snapshot) => {
            if !ctx.quiet {
                output::print_info(&format!(
                    "Resuming {} targets from {}",
                    snapshot.len(),
                    path.display()
                ));
            }
            Some(snapshot)
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to load checkpoint, starting a new scan");
            if !ctx.quiet {
                output::print_warning(&format!("{}; starting a new scan", e));
            }
            None
        }
    }
}
