//! JSON Lines output formatting.

use super::RecordSink;
use crate::error::ReportResult;
use crate::scanner::{ProbeOutcome, ProbeResult};
use chrono::SecondsFormat;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    address: &'a str,
    port: u16,
    status: ProbeOutcome,
    latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> JsonRecord<'a> {
    fn from_result(result: &'a ProbeResult) -> Self {
        Self {
            timestamp: result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            address: &result.target.address,
            port: result.target.port,
            status: result.outcome,
            // Two decimal places, as in CSV.
            latency_ms: (result.latency_ms() * 100.0).round() / 100.0,
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Writes one JSON object per result, one per line, no header.
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> RecordSink for JsonlSink<W> {
    fn write(&mut self, result: &ProbeResult) -> ReportResult<()> {
        serde_json::to_writer(&mut self.writer, &JsonRecord::from_result(result))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::types::Target;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_one_object_per_line() {
        let mut out = Vec::new();
        {
            let mut sink = JsonlSink::new(&mut out);
            let open = ProbeResult::new(
                Target::new("10.0.0.5", 22),
                ProbeOutcome::Open,
                Utc::now(),
                Duration::from_micros(2500),
            );
            let filtered = ProbeResult::new(
                Target::new("10.0.0.5", 23),
                ProbeOutcome::Filtered,
                Utc::now(),
                Duration::from_millis(100),
            )
            .with_error(ScanError::Timeout);
            sink.write(&open).unwrap();
            sink.write(&filtered).unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "OPEN");
        assert_eq!(lines[0]["latency_ms"], 2.5);
        assert!(lines[0].get("error").is_none());
        assert_eq!(lines[1]["port"], 23);
        assert_eq!(lines[1]["error"], "connection timed out");
    }

    #[test]
    fn test_latency_rounded_to_hundredths() {
        let result = |micros| {
            ProbeResult::new(
                Target::new("10.0.0.5", 22),
                ProbeOutcome::Closed,
                Utc::now(),
                Duration::from_micros(micros),
            )
        };
        assert_eq!(JsonRecord::from_result(&result(1234)).latency_ms, 1.23);
        assert_eq!(JsonRecord::from_result(&result(1237)).latency_ms, 1.24);
        assert_eq!(JsonRecord::from_result(&result(0)).latency_ms, 0.0);
        assert_eq!(JsonRecord::from_result(&result(100_004)).latency_ms, 100.0);
    }

    #[test]
    fn test_empty_run_writes_nothing() {
        let mut out = Vec::new();
        JsonlSink::new(&mut out).finish().unwrap();
        assert!(out.is_empty());
    }
}
