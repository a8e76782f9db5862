//! Probe targets and host specification parsing.
//!
//! A [`Target`] is one `(address, port)` pair. Addresses are kept exactly as
//! written: a hostname and the IP it resolves to are different targets.
//!
//! Host input supports:
//! - Single IP addresses (IPv4 and IPv6)
//! - CIDR notation (192.168.1.0/24)
//! - Hostnames (example.com)
//! - Comma-separated lists of the above, or a file of them

use super::Port;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

/// One address/port pair to probe.
///
/// Serialized as `{"ip": "...", "port": N}`, the checkpoint file layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Address exactly as supplied (IP literal or hostname).
    #[serde(rename = "ip")]
    pub address: String,
    /// Destination port.
    pub port: u16,
}

impl Target {
    /// Create a new target.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Parse the address as an IP literal, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            Some(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            _ => write!(f, "{}:{}", self.address, self.port),
        }
    }
}

/// Error type for host parsing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    #[error("invalid host format: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("CIDR range too large: {0} addresses (max: {1})")]
    CidrTooLarge(u128, u128),
    #[error("failed to read host file {0}: {1}")]
    File(String, String),
    #[error("empty host specification")]
    Empty,
}

/// A single host entry that may stand for several addresses.
#[derive(Debug, Clone)]
pub enum HostSpec {
    /// A single IP address.
    Single(IpAddr),
    /// A CIDR network range.
    Cidr(IpNetwork),
    /// A hostname, probed as written.
    Hostname(String),
}

impl HostSpec {
    /// Maximum number of hosts allowed in a CIDR range.
    pub const MAX_CIDR_HOSTS: u128 = 65536; // /16 for IPv4

    /// Parse a host specification from a string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| TargetError::InvalidCidr(s.to_string()))?;

            let host_count = network_size(&network);
            if host_count > Self::MAX_CIDR_HOSTS {
                return Err(TargetError::CidrTooLarge(host_count, Self::MAX_CIDR_HOSTS));
            }

            return Ok(Self::Cidr(network));
        }

        if is_valid_hostname(s) {
            return Ok(Self::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Expand into address strings.
    ///
    /// IPv4 CIDR blocks shorter than /31 exclude their network and broadcast
    /// addresses.
    pub fn expand(&self) -> Vec<String> {
        match self {
            Self::Single(ip) => vec![ip.to_string()],
            Self::Hostname(hostname) => vec![hostname.clone()],
            Self::Cidr(network) => network
                .iter()
                .filter(|ip| match (network, ip) {
                    (IpNetwork::V4(net), IpAddr::V4(addr)) if net.prefix() < 31 => {
                        *addr != net.network() && *addr != net.broadcast()
                    }
                    _ => true,
                })
                .map(|ip| ip.to_string())
                .collect(),
        }
    }
}

impl FromStr for HostSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Resolve an `--ip` argument into an ordered, de-duplicated host list.
///
/// An existing file is read (one entry per line; `.csv` files use the first
/// column and skip the header row), anything else is split on commas.
pub fn load_hosts(input: &str) -> Result<Vec<String>, TargetError> {
    let path = Path::new(input);
    let entries = if path.is_file() {
        read_host_file(path)?
    } else {
        input.split(',').map(|s| s.trim().to_string()).collect()
    };

    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for entry in entries.iter().filter(|e| !e.is_empty()) {
        for host in HostSpec::parse(entry)?.expand() {
            if seen.insert(host.clone()) {
                hosts.push(host);
            }
        }
    }

    if hosts.is_empty() {
        return Err(TargetError::Empty);
    }
    Ok(hosts)
}

fn read_host_file(path: &Path) -> Result<Vec<String>, TargetError> {
    let display = path.display().to_string();
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| TargetError::File(display.clone(), e.to_string()))?;
        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TargetError::File(display.clone(), e.to_string()))?;
            if let Some(first) = record.get(0) {
                entries.push(first.trim().to_string());
            }
        }
        Ok(entries)
    } else {
        let content =
            fs::read_to_string(path).map_err(|e| TargetError::File(display, e.to_string()))?;
        Ok(content.lines().map(|l| l.trim().to_string()).collect())
    }
}

/// Cross product of hosts and ports, host-major.
pub fn expand_targets(hosts: &[String], ports: &[Port]) -> Vec<Target> {
    hosts
        .iter()
        .flat_map(|host| ports.iter().map(move |port| Target::new(host.clone(), port.as_u16())))
        .collect()
}

fn network_size(network: &IpNetwork) -> u128 {
    match network {
        IpNetwork::V4(net) => net.size() as u128,
        IpNetwork::V6(net) => {
            let prefix = net.prefix() as u32;
            if prefix >= 128 {
                1
            } else if prefix == 0 {
                u128::MAX
            } else {
                1u128 << (128 - prefix)
            }
        }
    }
}

/// Check if a string is a valid hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.starts_with(|c: char| c.is_ascii_alphanumeric())
            && label.ends_with(|c: char| c.is_ascii_alphanumeric())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
