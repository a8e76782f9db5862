//! CSV output formatting.

use super::{format_latency, RecordSink, RECORD_FIELDS};
use crate::error::ReportResult;
use crate::scanner::ProbeResult;
use chrono::SecondsFormat;
use std::io::Write;

/// Writes results as CSV rows under a header of field names.
pub struct CsvSink<W: Write> {
    wtr: csv::Writer<W>,
}

impl<W: Write + Send> CsvSink<W> {
    /// Wrap `writer` and write the header row at once.
    pub fn new(writer: W) -> ReportResult<Self> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(RECORD_FIELDS)?;
        wtr.flush()?;
        Ok(Self { wtr })
    }

    /// Wrap `writer` that already carries a header.
    pub fn without_header(writer: W) -> Self {
        Self {
            wtr: csv::Writer::from_writer(writer),
        }
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn write(&mut self, result: &ProbeResult) -> ReportResult<()> {
        self.wtr.write_record([
            result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true).as_str(),
            result.target.address.as_str(),
            result.target.port.to_string().as_str(),
            result.outcome.as_str(),
            format_latency(result).as_str(),
        ])?;
        self.wtr.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        self.wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ProbeOutcome;
    use crate::types::Target;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn test_header_and_row() {
        let mut out = Vec::new();
        {
            let mut sink = CsvSink::new(&mut out).unwrap();
            let result = ProbeResult::new(
                Target::new("10.0.0.5", 8080),
                ProbeOutcome::Open,
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                Duration::from_micros(1234),
            );
            sink.write(&result).unwrap();
            sink.finish().unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,address,port,status,latency_ms");
        assert_eq!(lines[1], "2024-05-01T12:00:00.000Z,10.0.0.5,8080,OPEN,1.23");
    }

    #[test]
    fn test_header_only_when_empty() {
        let mut out = Vec::new();
        CsvSink::new(&mut out).unwrap().finish().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "timestamp,address,port,status,latency_ms\n"
        );
    }
}
