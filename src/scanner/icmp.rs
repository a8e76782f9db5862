//! Host reachability probes for the prefilter.
//!
//! Two methods, picked once per run:
//!
//! - **Raw ICMP echo** over a layer-4 raw socket (needs privileges). Each
//!   worker owns its socket and stamps its own echo identifier, since every
//!   raw ICMP socket sees every inbound echo reply.
//! - **System ping**: shells out to the platform `ping` for one echo.

use crate::error::ScanError;
use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::Packet;
use pnet::transport::{
    self, icmp_packet_iter, TransportChannelType::Layer4, TransportProtocol::Ipv4,
    TransportReceiver, TransportSender,
};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// ICMP echo header (type, code, checksum, identifier, sequence).
const ECHO_HEADER_LEN: usize = 8;

/// Payload carried in every echo request.
const ECHO_PAYLOAD: &[u8] = b"portrunr";

/// Base identifier; the worker ordinal is added to it.
const ECHO_ID_BASE: u16 = 0x1234;

/// Extra time the `ping` process gets to start and exit.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// How hosts are pinged during the prefilter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingMethod {
    /// Raw ICMP echo from inside the process.
    Raw,
    /// The platform `ping` command.
    System,
}

/// A single reachability check.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Return `true` if `host` answered within the timeout.
    async fn ping(&self, host: &str) -> bool;
}

/// A boxed pinger for dynamic dispatch.
pub type BoxedPinger = Box<dyn Pinger>;

/// Build the pinger for one prefilter worker.
///
/// A raw pinger that fails to open its socket degrades to the system
/// pinger for that worker.
pub fn create_pinger(method: PingMethod, worker_id: usize, timeout: Duration) -> BoxedPinger {
    match method {
        PingMethod::Raw => {
            let identifier = ECHO_ID_BASE.wrapping_add(worker_id as u16);
            match IcmpPinger::new(identifier, timeout) {
                Ok(pinger) => Box::new(pinger),
                Err(e) => {
                    warn!(worker_id, error = %e, "raw ICMP unavailable, using system ping");
                    Box::new(SystemPinger::new(timeout))
                }
            }
        }
        PingMethod::System => Box::new(SystemPinger::new(timeout)),
    }
}

struct IcmpChannel {
    tx: TransportSender,
    rx: TransportReceiver,
}

/// Raw ICMP echo pinger.
pub struct IcmpPinger {
    identifier: u16,
    sequence: AtomicU16,
    timeout: Duration,
    channel: Arc<Mutex<IcmpChannel>>,
    resolver: TokioAsyncResolver,
}

impl IcmpPinger {
    /// Open a raw ICMP socket for echo requests stamped with `identifier`.
    pub fn new(identifier: u16, timeout: Duration) -> Result<Self, ScanError> {
        let (tx, rx) = transport::transport_channel(
            4096,
            Layer4(Ipv4(IpNextHeaderProtocols::Icmp)),
        )
        .map_err(|e| ScanError::RawSocketError(e.to_string()))?;

        Ok(Self {
            identifier,
            sequence: AtomicU16::new(1),
            timeout,
            channel: Arc::new(Mutex::new(IcmpChannel { tx, rx })),
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        })
    }

    /// Resolve a host to the IPv4 address the echo is sent to.
    async fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => return Some(ip),
            Ok(IpAddr::V6(_)) => return None,
            Err(_) => {}
        }

        let lookup = timeout(self.timeout, self.resolver.lookup_ip(host)).await;
        match lookup {
            Ok(Ok(response)) => response.iter().find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            }),
            Ok(Err(e)) => {
                debug!(host, error = %e, "hostname resolution failed");
                None
            }
            Err(_) => None,
        }
    }
}

impl IcmpChannel {
    fn echo(
        &mut self,
        destination: Ipv4Addr,
        identifier: u16,
        sequence: u16,
        timeout: Duration,
    ) -> Result<bool, ScanError> {
        let mut buffer = [0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD.len()];
        let request = build_echo_request(&mut buffer, identifier, sequence)?;
        self.tx
            .send_to(request, IpAddr::V4(destination))
            .map_err(|e| ScanError::RawSocketError(format!("failed to send echo: {}", e)))?;

        let deadline = Instant::now() + timeout;
        let mut replies = icmp_packet_iter(&mut self.rx);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            match replies.next_with_timeout(remaining) {
                Ok(Some((reply, from))) => {
                    if from == IpAddr::V4(destination) && is_our_reply(&reply, identifier, sequence)
                    {
                        return Ok(true);
                    }
                }
                Ok(None) => return Ok(false),
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(ScanError::RawSocketError(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn ping(&self, host: &str) -> bool {
        let Some(destination) = self.resolve(host).await else {
            return false;
        };

        let channel = Arc::clone(&self.channel);
        let identifier = self.identifier;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let timeout = self.timeout;
        let echo = tokio::task::spawn_blocking(move || {
            let mut channel = channel
                .lock()
                .map_err(|_| ScanError::RawSocketError("ICMP channel lock poisoned".to_string()))?;
            channel.echo(destination, identifier, sequence, timeout)
        })
        .await;

        match echo {
            Ok(Ok(reachable)) => reachable,
            Ok(Err(e)) => {
                debug!(host, error = %e, "raw echo failed");
                false
            }
            Err(e) => {
                debug!(host, error = %e, "echo task failed");
                false
            }
        }
    }
}

/// Pinger that runs the platform `ping` for one echo.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    timeout: Duration,
}

impl SystemPinger {
    /// Create a system pinger bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Reply wait handed to `ping`; most implementations take whole seconds.
    fn wait_secs(&self) -> u64 {
        let secs = self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0);
        secs.max(1)
    }

    fn command(&self, host: &str) -> Command {
        let mut command = Command::new("ping");
        if cfg!(windows) {
            let millis = self.timeout.as_millis().max(1).to_string();
            command.args(["-n", "1", "-w", &millis, host]);
        } else {
            let secs = self.wait_secs().to_string();
            command.args(["-c", "1", "-W", &secs, host]);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, host: &str) -> bool {
        let deadline = Duration::from_secs(self.wait_secs()) + PROCESS_GRACE;
        match timeout(deadline, self.command(host).status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(host, error = %e, "failed to run ping");
                false
            }
            Err(_) => false,
        }
    }
}

fn build_echo_request(
    buffer: &mut [u8],
    identifier: u16,
    sequence: u16,
) -> Result<MutableEchoRequestPacket<'_>, ScanError> {
    let mut request = MutableEchoRequestPacket::new(buffer)
        .ok_or_else(|| ScanError::InvalidPacket("buffer too small for echo request".to_string()))?;
    request.set_icmp_type(IcmpTypes::EchoRequest);
    request.set_identifier(identifier);
    request.set_sequence_number(sequence);
    request.set_payload(ECHO_PAYLOAD);

    let checksum = IcmpPacket::new(request.packet())
        .map(|packet| icmp::checksum(&packet))
        .ok_or_else(|| ScanError::InvalidPacket("malformed echo request".to_string()))?;
    request.set_checksum(checksum);
    Ok(request)
}

fn is_our_reply(reply: &IcmpPacket<'_>, identifier: u16, sequence: u16) -> bool {
    if reply.get_icmp_type() != IcmpTypes::EchoReply {
        return false;
    }
    EchoReplyPacket::new(reply.packet()).is_some_and(|echo| {
        echo.get_identifier() == identifier && echo.get_sequence_number() == sequence
    })
}
