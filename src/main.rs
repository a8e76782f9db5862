use anyhow::Context as _;
use clap::Parser;
use portrunner::cli::{self, Cli, Context};
use portrunner::config::Settings;
use portrunner::logging::{self, LogConfig};
use portrunner::output;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref()).context("loading settings")?;

    let _log_guard = logging::init(&LogConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| settings.log_level.clone()),
        verbose: args.verbose,
        quiet: args.quiet,
        file: args.log_file.clone(),
    })
    .context("initializing logging")?;

    let cancel = CancellationToken::new();
    cli::spawn_interrupt_handler(cancel.clone());

    let ctx = Context {
        settings,
        verbose: args.verbose,
        quiet: args.quiet,
        cancel,
    };
    if let Err(e) = args.command.execute(&ctx).await {
        error!(error = %e, "run failed");
        return Err(e.into());
    }
    Ok(())
}
