//! TCP Connect probe implementation.
//!
//! Performs standard TCP connect probes using the operating system's
//! socket API. This is the most reliable method but also the most
//! detectable as it completes the full TCP handshake.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::{ProbeOutcome, ProbeResult, Prober};
use crate::types::Target;
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{self, TcpStream};
use tokio::time::timeout;
use tracing::trace;

/// TCP Connect prober.
///
/// Uses standard socket connect() calls to determine port status.
/// Does not require elevated privileges.
///
/// # Classification
///
/// - handshake completed: `OPEN` (the connection is shut down at once)
/// - dial deadline exceeded: `FILTERED`
/// - refused, reset, unreachable: `CLOSED`
/// - address that cannot be parsed or resolved: `ERROR`
#[derive(Debug, Clone)]
pub struct TcpConnectScanner {
    timeout: Duration,
}

impl TcpConnectScanner {
    /// Create a new TCP connect prober with the given dial timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Turn the target address into a socket address.
    ///
    /// IP literals are used directly; hostnames are looked up, bounded by
    /// the dial timeout.
    async fn resolve(&self, target: &Target) -> ScanResult<SocketAddr> {
        if let Some(ip) = target.ip() {
            return Ok(SocketAddr::new(ip, target.port));
        }

        let lookup = net::lookup_host((target.address.as_str(), target.port));
        let mut addrs = match timeout(self.timeout, lookup).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                return Err(ScanError::InvalidAddress(format!(
                    "{}: {}",
                    target.address, e
                )))
            }
            Err(_) => {
                return Err(ScanError::InvalidAddress(format!(
                    "{}: lookup timed out",
                    target.address
                )))
            }
        };

        addrs
            .next()
            .ok_or_else(|| ScanError::InvalidAddress(format!("{}: no addresses", target.address)))
    }

    /// Attempt to connect to the target address.
    async fn attempt_connect(&self, addr: SocketAddr) -> ScanResult<TcpStream> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(classify_io_error(addr, e)),
            Err(_) => Err(ScanError::Timeout),
        }
    }
}

/// Map a dial failure onto the scan error taxonomy.
fn classify_io_error(addr: SocketAddr, e: std::io::Error) -> ScanError {
    match e.kind() {
        ErrorKind::ConnectionRefused => ScanError::ConnectionRefused,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => ScanError::ConnectionReset,
        ErrorKind::TimedOut => ScanError::Timeout,
        _ => {
            let error_str = e.to_string().to_lowercase();
            if error_str.contains("unreachable") {
                if error_str.contains("host") {
                    ScanError::HostUnreachable
                } else {
                    ScanError::NetworkUnreachable(e.to_string())
                }
            } else {
                ScanError::ConnectionFailed {
                    target: addr.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Prober for TcpConnectScanner {
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn probe(&self, target: Target) -> ProbeResult {
        let timestamp = Utc::now();
        let start = Instant::now();

        let attempt = match self.resolve(&target).await {
            Ok(addr) => self.attempt_connect(addr).await,
            Err(e) => Err(e),
        };
        let latency = start.elapsed();

        match attempt {
            Ok(mut stream) => {
                if let Err(e) = stream.shutdown().await {
                    trace!(target = %target, error = %e, "shutdown after connect failed");
                }
                ProbeResult::new(target, ProbeOutcome::Open, timestamp, latency)
            }
            Err(e) => {
                let outcome = if e.is_timeout() {
                    ProbeOutcome::Filtered
                } else if matches!(e, ScanError::InvalidAddress(_)) {
                    ProbeOutcome::Error
                } else {
                    ProbeOutcome::Closed
                };
                ProbeResult::new(target, outcome, timestamp, latency).with_error(e)
            }
        }
    }
}
