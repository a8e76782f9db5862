//! Scanner module - the probe strategies and the prefilter pingers.
//!
//! Every worker owns its own prober instance, built up front by
//! [`create_probers`] so that a strategy that cannot start (a SYN prober
//! without raw socket access) fails the run before anything is dispatched.

pub mod dry_run;
pub mod icmp;
pub mod rate_limiter;
pub mod syn;
pub mod tcp;
pub mod traits;

use crate::error::{ScanError, ScanResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::time::Duration;
use tracing::debug;

pub use dry_run::DryRunScanner;
pub use icmp::{create_pinger, BoxedPinger, IcmpPinger, PingMethod, Pinger, SystemPinger};
pub use rate_limiter::RateLimiter;
pub use syn::SynScanner;
pub use tcp::TcpConnectScanner;
pub use traits::{BoxedProber, ProbeOutcome, ProbeResult, Prober, ScanType};

/// Build one prober per worker.
///
/// Dry run wins over the scan type. SYN probers take the source port
/// `source_port_base + worker ordinal`, so each worker can pick its own
/// replies off the shared raw socket traffic.
pub fn create_probers(
    scan_type: ScanType,
    dry_run: bool,
    workers: usize,
    timeout: Duration,
    source_port_base: u16,
) -> ScanResult<Vec<BoxedProber>> {
    (0..workers)
        .map(|ordinal| -> ScanResult<BoxedProber> {
            if dry_run {
                return Ok(Box::new(DryRunScanner));
            }
            match scan_type {
                ScanType::Connect => Ok(Box::new(TcpConnectScanner::new(timeout))),
                ScanType::Syn => {
                    let source_port = u16::try_from(ordinal)
                        .ok()
                        .and_then(|offset| source_port_base.checked_add(offset))
                        .ok_or_else(|| {
                            ScanError::InvalidConfig(format!(
                                "source port base {} leaves no room for {} workers",
                                source_port_base, workers
                            ))
                        })?;
                    Ok(Box::new(SynScanner::new(source_port, timeout)?))
                }
            }
        })
        .collect()
}

/// Whether this process may open a raw socket for `protocol`.
///
/// Opens and immediately closes one, so it reflects capabilities as well
/// as the effective user.
pub fn raw_socket_available(protocol: Protocol) -> bool {
    match Socket::new(Domain::IPV4, Type::RAW, Some(protocol)) {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "raw socket unavailable");
            false
        }
    }
}

/// Pick the prefilter method once for the whole run.
pub fn detect_ping_method() -> PingMethod {
    if raw_socket_available(Protocol::ICMPV4) {
        PingMethod::Raw
    } else {
        PingMethod::System
    }
}
