//! The reporter: the single consumer of probe results.
//!
//! Runs on a blocking thread, since every record is written and flushed
//! synchronously before the next one is taken off the channel.

use super::{CsvSink, JsonlSink, OutputFormat, RecordSink};
use crate::error::{ReportError, ReportResult};
use crate::scanner::{ProbeOutcome, ProbeResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Counts of written records per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    counts: [usize; ProbeOutcome::ALL.len()],
}

impl ReportSummary {
    fn record(&mut self, outcome: ProbeOutcome) {
        self.counts[outcome as usize] += 1;
    }

    /// Number of records with `outcome`.
    pub fn count(&self, outcome: ProbeOutcome) -> usize {
        self.counts[outcome as usize]
    }

    /// Number of records written.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = ProbeOutcome::ALL
            .iter()
            .filter(|o| self.count(**o) > 0)
            .map(|o| format!("{} {}", self.count(*o), o.as_str().to_lowercase()))
            .collect();
        if parts.is_empty() {
            write!(f, "no results")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Owns the output file for the duration of a run.
pub struct Reporter {
    sink: Box<dyn RecordSink>,
    path: PathBuf,
    progress: Option<ProgressBar>,
}

impl Reporter {
    /// Open the output file and write the format's header.
    ///
    /// With `append`, an existing file is extended instead of truncated and
    /// a CSV header is written only if the file is empty, so a resumed run
    /// adds to the results of the interrupted one.
    pub fn create(path: &Path, format: OutputFormat, append: bool) -> ReportResult<Self> {
        let create_failed = |source| ReportError::CreateFailed {
            path: path.to_path_buf(),
            source,
        };
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(create_failed)?;
        let has_content = file.metadata().map_err(create_failed)?.len() > 0;

        let writer = BufWriter::new(file);
        let sink: Box<dyn RecordSink> = match format {
            OutputFormat::Csv if has_content => Box::new(CsvSink::without_header(writer)),
            OutputFormat::Csv => Box::new(CsvSink::new(writer)?),
            OutputFormat::Jsonl => Box::new(JsonlSink::new(writer)),
        };

        debug!(path = %path.display(), %format, append, "output opened");
        Ok(Self {
            sink,
            path: path.to_path_buf(),
            progress: None,
        })
    }

    /// Show a progress bar sized for `total` records.
    pub fn with_progress(mut self, total: u64) -> Self {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        self.progress = Some(pb);
        self
    }

    /// Start consuming `results` on a blocking thread.
    ///
    /// The task ends when every sender is dropped and the channel is empty,
    /// returning the per-outcome summary. A write failure ends it early;
    /// dropping the receiver then makes the workers stop as well.
    pub fn spawn(self, results: mpsc::Receiver<ProbeResult>) -> JoinHandle<ReportResult<ReportSummary>> {
        tokio::task::spawn_blocking(move || self.run(results))
    }

    fn run(mut self, mut results: mpsc::Receiver<ProbeResult>) -> ReportResult<ReportSummary> {
        let mut summary = ReportSummary::default();

        while let Some(result) = results.blocking_recv() {
            if let Some(error) = &result.error {
                debug!(target = %result.target, outcome = %result.outcome, %error, "probe failed");
            }
            if result.is_open() {
                info!(target = %result.target, latency_ms = result.latency_ms(), "open");
            }

            self.sink.write(&result)?;
            summary.record(result.outcome);

            if let Some(pb) = &self.progress {
                pb.inc(1);
                if result.is_open() {
                    pb.set_message(format!("open: {}", result.target));
                }
            }
        }

        self.sink.finish()?;
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        debug!(path = %self.path.display(), records = summary.total(), "output closed");
        Ok(summary)
    }
}
