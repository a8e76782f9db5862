//! Resume subcommand: continue from a checkpoint or fail.

use super::run::{self, Context, TargetSource};
use super::RunOptions;
use crate::config::{RunConfig, RunOverrides};
use crate::error::CliResult;
use crate::output;
use crate::storage::CheckpointSnapshot;
use clap::Parser;
use std::path::PathBuf;

/// Resume an interrupted run from its checkpoint file.
#[derive(Parser, Debug)]
pub struct ResumeCommand {
    /// Checkpoint written by an interrupted run
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub options: RunOptions,
}

impl ResumeCommand {
    /// Execute the resume command. A missing or corrupt checkpoint is fatal.
    ///
    /// The checkpoint file is deleted only once probing starts.
    pub async fn execute(&self, ctx: &Context) -> CliResult<()> {
        let config = RunConfig::resolve(&ctx.settings, &RunOverrides::from(&self.options))?;
        let snapshot = CheckpointSnapshot::load(&self.file)?;

        if !ctx.quiet {
            output::print_info(&format!(
                "Resuming {} targets from {} (saved {})",
                snapshot.len(),
                self.file.display(),
                snapshot.time.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        let source = TargetSource::Checkpoint {
            path: self.file.clone(),
            snapshot,
        };
        run::execute(ctx, config, source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::{CheckpointError, CliError, ReportError};
    use crate::types::Target;
    use std::fs;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn context() -> Context {
        Context {
            settings: Settings::default(),
            verbose: false,
            quiet: true,
            cancel: CancellationToken::new(),
        }
    }

    fn command(dir: &TempDir, file: PathBuf) -> ResumeCommand {
        ResumeCommand {
            file,
            options: RunOptions {
                delay: Some(0),
                dry_run: true,
                output: Some(dir.path().join("results.csv")),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_resume_probes_saved_targets() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("checkpoint.json");
        CheckpointSnapshot::new(vec![
            Target::new("192.0.2.1", 22),
            Target::new("192.0.2.1", 80),
            Target::new("192.0.2.2", 22),
        ])
        .save(&file)
        .unwrap();

        command(&dir, file.clone()).execute(&context()).await.unwrap();

        let text = fs::read_to_string(dir.path().join("results.csv")).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_interrupt_before_start_rewrites_checkpoint() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("checkpoint.json");
        CheckpointSnapshot::new(vec![
            Target::new("192.0.2.1", 22),
            Target::new("192.0.2.2", 22),
        ])
        .save(&file)
        .unwrap();

        let ctx = context();
        ctx.cancel.cancel();
        let mut cmd = command(&dir, file.clone());
        cmd.options.checkpoint = Some(file.clone());
        cmd.execute(&ctx).await.unwrap();

        // Same path in and out: the run took the file over and wrote it back.
        let again = CheckpointSnapshot::load(&file).unwrap();
        assert_eq!(
            again.remaining,
            vec![Target::new("192.0.2.1", 22), Target::new("192.0.2.2", 22)]
        );
        let text = fs::read_to_string(dir.path().join("results.csv")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_output_failure_keeps_checkpoint() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("checkpoint.json");
        CheckpointSnapshot::new(vec![Target::new("192.0.2.1", 22)])
            .save(&file)
            .unwrap();

        let mut cmd = command(&dir, file.clone());
        cmd.options.output = Some(dir.path().join("absent").join("results.csv"));
        let err = cmd.execute(&context()).await.unwrap_err();

        assert!(matches!(err, CliError::Report(ReportError::CreateFailed { .. })));
        assert_eq!(CheckpointSnapshot::load(&file).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_checkpoint_is_kept_and_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("checkpoint.json");
        CheckpointSnapshot::new(Vec::new()).save(&file).unwrap();

        let err = command(&dir, file.clone()).execute(&context()).await.unwrap_err();
        assert!(matches!(err, CliError::NoTargets));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("checkpoint.json");
        fs::write(&file, "{").unwrap();

        let err = command(&dir, file).execute(&context()).await.unwrap_err();
        assert!(matches!(err, CliError::Checkpoint(CheckpointError::Corrupt { .. })));
        assert!(!dir.path().join("results.csv").exists());
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = command(&dir, dir.path().join("absent.json"))
            .execute(&context())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Checkpoint(CheckpointError::NotFound(_))));
    }
}
