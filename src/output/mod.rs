//! Output module.
//!
//! Record sinks for the result file (CSV and JSON Lines), the reporter
//! task that feeds them, and styled console messages.

mod csv_format;
mod json_format;
mod plain;
mod reporter;

pub use csv_format::CsvSink;
pub use json_format::JsonlSink;
pub use plain::{
    print_error, print_info, print_run_header, print_success, print_summary, print_warning,
};
pub use reporter::{ReportSummary, Reporter};

use crate::error::ReportResult;
use crate::scanner::ProbeResult;
use serde::{Deserialize, Serialize};

/// Field names of an output record, in column order.
pub const RECORD_FIELDS: [&str; 5] = ["timestamp", "address", "port", "status", "latency_ms"];

/// Result file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Destination for result records.
///
/// Every successful [`write`](RecordSink::write) is flushed, so a record
/// that was accepted survives a crash of the process right after.
pub trait RecordSink: Send {
    /// Persist one record.
    fn write(&mut self, result: &ProbeResult) -> ReportResult<()>;

    /// Flush anything still buffered.
    fn finish(&mut self) -> ReportResult<()>;
}

/// Latency rendered the way every format writes it: milliseconds, two places.
pub(crate) fn format_latency(result: &ProbeResult) -> String {
    format!("{:.2}", result.latency_ms())
}
