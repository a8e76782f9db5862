//! Port numbers and the `--port` input.
//!
//! Inline specifications mix single ports and inclusive ranges
//! (`22,80,8000-8010`); a path to an existing file is read instead.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// A validated network port number (1-65535).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u16);

impl Port {
    /// `None` for port 0.
    #[inline]
    pub const fn new(port: u16) -> Option<Self> {
        if port == 0 {
            None
        } else {
            Some(Self(port))
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Port {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value: u32 = s
            .parse()
            .map_err(|_| PortError::InvalidFormat(s.to_string()))?;
        u16::try_from(value)
            .ok()
            .and_then(Port::new)
            .ok_or(PortError::OutOfRange(value))
    }
}

/// Error type for port parsing and validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("port {0} is out of valid range (1-65535)")]
    OutOfRange(u32),
    #[error("invalid port number: {0}")]
    InvalidFormat(String),
    #[error("invalid port range: start ({0}) > end ({1})")]
    InvalidRange(u16, u16),
    #[error("empty port specification")]
    Empty,
    #[error("failed to read port file {0}: {1}")]
    File(String, String),
}

/// The set of ports to probe, sorted and free of duplicates.
#[derive(Debug, Clone, Default)]
pub struct PortSpec {
    ports: BTreeSet<Port>,
}

impl PortSpec {
    /// Resolve a `--port` argument: an existing file is read, anything else
    /// is parsed as an inline specification.
    pub fn load(input: &str) -> Result<Self, PortError> {
        let path = Path::new(input);
        if path.is_file() {
            Self::from_file(path)
        } else {
            input.parse()
        }
    }

    /// Read ports from a file.
    ///
    /// Plain files hold one port or range per line. CSV files carry the port
    /// in the second column, optionally suffixed with `/proto` (`443/tcp`);
    /// rows whose second column is not a port (such as a header) are skipped.
    pub fn from_file(path: &Path) -> Result<Self, PortError> {
        let display = path.display().to_string();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        let mut spec = Self::default();
        if is_csv {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(path)
                .map_err(|e| PortError::File(display.clone(), e.to_string()))?;
            for record in reader.records() {
                let record = record.map_err(|e| PortError::File(display.clone(), e.to_string()))?;
                let Some(field) = record.get(1) else { continue };
                let port = field.split('/').next().unwrap_or_default();
                if let Ok(port) = port.parse::<Port>() {
                    spec.ports.insert(port);
                }
            }
        } else {
            let content =
                fs::read_to_string(path).map_err(|e| PortError::File(display, e.to_string()))?;
            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                spec.insert_range(line)?;
            }
        }

        if spec.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(spec)
    }

    /// Add `80` or `8000-8010`.
    fn insert_range(&mut self, part: &str) -> Result<(), PortError> {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (start.parse::<Port>()?, end.parse::<Port>()?),
            None => {
                let port = part.parse::<Port>()?;
                (port, port)
            }
        };
        if start > end {
            return Err(PortError::InvalidRange(start.0, end.0));
        }
        self.ports.extend((start.0..=end.0).map(Port));
        Ok(())
    }

    /// Ports in ascending order.
    pub fn to_ports(&self) -> Vec<Port> {
        self.ports.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl FromStr for PortSpec {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = Self::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            spec.insert_range(part)?;
        }
        if spec.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn numbers(spec: &PortSpec) -> Vec<u16> {
        spec.to_ports().into_iter().map(Port::as_u16).collect()
    }

    #[test]
    fn test_port_validation() {
        assert!(Port::new(0).is_none());
        assert_eq!("65535".parse::<Port>().unwrap().as_u16(), 65535);
        assert!(matches!("70000".parse::<Port>(), Err(PortError::OutOfRange(70000))));
        assert!(matches!("0".parse::<Port>(), Err(PortError::OutOfRange(0))));
        assert!(matches!("http".parse::<Port>(), Err(PortError::InvalidFormat(_))));
    }

    #[test]
    fn test_inline_lists_and_ranges() {
        let spec: PortSpec = "443, 22,8000-8003".parse().unwrap();
        assert_eq!(numbers(&spec), vec![22, 443, 8000, 8001, 8002, 8003]);

        let spec: PortSpec = "1-1000".parse().unwrap();
        assert_eq!(spec.len(), 1000);
    }

    #[test]
    fn test_overlaps_collapse() {
        let spec: PortSpec = "80,80,79-81,443,80".parse().unwrap();
        assert_eq!(numbers(&spec), vec![79, 80, 81, 443]);
    }

    #[test]
    fn test_bad_inline_input() {
        assert!(matches!("".parse::<PortSpec>(), Err(PortError::Empty)));
        assert!(matches!(" , ".parse::<PortSpec>(), Err(PortError::Empty)));
        assert!(matches!("90-80".parse::<PortSpec>(), Err(PortError::InvalidRange(90, 80))));
        assert!("22,0".parse::<PortSpec>().is_err());
        assert!("1-2-3".parse::<PortSpec>().is_err());
    }

    #[test]
    fn test_text_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "22\n\n8000-8002\n").unwrap();
        let spec = PortSpec::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(numbers(&spec), vec![22, 8000, 8001, 8002]);
    }

    #[test]
    fn test_csv_file_second_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "service,port\nssh,22/tcp\nhttps,443/tcp\nbogus,notaport").unwrap();
        let spec = PortSpec::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(numbers(&spec), vec![22, 443]);
    }

    #[test]
    fn test_csv_file_without_ports_is_empty() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "service,port\nssh,tcp").unwrap();
        let err = PortSpec::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, PortError::Empty));
    }
}
