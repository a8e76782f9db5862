//! SYN (half-open) probe implementation.
//!
//! Sends a single crafted TCP SYN segment over a raw socket and classifies
//! the reply without completing the handshake. Requires raw socket access
//! (elevated privileges).
//!
//! # How It Works
//!
//! 1. Send a TCP SYN from this worker's dedicated source port
//! 2. Read raw TCP segments until one arrives from the target address,
//!    from the probed port, addressed to our source port:
//!    - SYN/ACK: port is open
//!    - RST: port is closed
//! 3. Nothing matching before the deadline: port is filtered
//!
//! The kernel answers the SYN/ACK with its own RST since no socket owns the
//! connection, so the handshake is never completed.
//!
//! Every raw TCP socket on the host sees every inbound segment, so each
//! worker must use a distinct source port to recognise its own replies.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::{ProbeOutcome, ProbeResult, Prober};
use crate::types::Target;
use async_trait::async_trait;
use chrono::Utc;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::transport::{
    self, tcp_packet_iter, TransportChannelType::Layer4, TransportProtocol::Ipv4,
    TransportReceiver, TransportSender,
};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Size of a TCP header without options.
const TCP_HEADER_LEN: usize = 20;

/// Receive buffer for the raw channel.
const CHANNEL_BUFFER: usize = 4096;

/// Raw send/receive pair owned by one prober.
struct RawChannel {
    tx: TransportSender,
    rx: TransportReceiver,
}

/// SYN prober.
///
/// **Requires elevated privileges (root/sudo).** Construction opens the raw
/// socket, so a missing privilege is reported once at startup rather than
/// on every probe.
pub struct SynScanner {
    source_port: u16,
    timeout: Duration,
    channel: Arc<Mutex<RawChannel>>,
}

impl SynScanner {
    /// Create a new SYN prober.
    ///
    /// # Arguments
    /// * `source_port` - Source port stamped on every SYN; must be unique per worker
    /// * `timeout` - How long to wait for a reply
    ///
    /// # Errors
    /// Returns an error if the raw socket cannot be opened.
    pub fn new(source_port: u16, timeout: Duration) -> ScanResult<Self> {
        let (tx, rx) = transport::transport_channel(
            CHANNEL_BUFFER,
            Layer4(Ipv4(IpNextHeaderProtocols::Tcp)),
        )
        .map_err(open_error)?;

        Ok(Self {
            source_port,
            timeout,
            channel: Arc::new(Mutex::new(RawChannel { tx, rx })),
        })
    }
}

impl RawChannel {
    /// Send one SYN and wait for the matching reply.
    fn exchange(
        &mut self,
        destination: Ipv4Addr,
        dest_port: u16,
        source_port: u16,
        timeout: Duration,
    ) -> ScanResult<ProbeOutcome> {
        let source = source_ip_for(destination)?;

        let mut buffer = [0u8; TCP_HEADER_LEN];
        let packet = build_syn_packet(&mut buffer, source, destination, source_port, dest_port)?;
        self.tx
            .send_to(packet, IpAddr::V4(destination))
            .map_err(|e| ScanError::RawSocketError(format!("failed to send SYN: {}", e)))?;

        let deadline = Instant::now() + timeout;
        let mut replies = tcp_packet_iter(&mut self.rx);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ProbeOutcome::Filtered);
            }

            match replies.next_with_timeout(remaining) {
                Ok(Some((reply, from))) => {
                    if from != IpAddr::V4(destination)
                        || reply.get_source() != dest_port
                        || reply.get_destination() != source_port
                    {
                        continue;
                    }
                    if let Some(outcome) = classify_reply(&reply) {
                        return Ok(outcome);
                    }
                }
                Ok(None) => return Ok(ProbeOutcome::Filtered),
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(ScanError::RawSocketError(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl Prober for SynScanner {
    fn name(&self) -> &'static str {
        "syn"
    }

    async fn probe(&self, target: Target) -> ProbeResult {
        let timestamp = Utc::now();
        let start = Instant::now();

        let destination = match target.ip() {
            Some(IpAddr::V4(ip)) => ip,
            _ => {
                let error = ScanError::InvalidAddress(format!(
                    "{}: SYN probing needs an IPv4 address",
                    target.address
                ));
                return ProbeResult::new(target, ProbeOutcome::Error, timestamp, start.elapsed())
                    .with_error(error);
            }
        };

        let channel = Arc::clone(&self.channel);
        let (source_port, dest_port, timeout) = (self.source_port, target.port, self.timeout);
        let exchange = tokio::task::spawn_blocking(move || {
            let mut channel = channel
                .lock()
                .map_err(|_| ScanError::RawSocketError("raw channel lock poisoned".to_string()))?;
            channel.exchange(destination, dest_port, source_port, timeout)
        })
        .await;
        let latency = start.elapsed();

        match exchange {
            Ok(Ok(ProbeOutcome::Filtered)) => {
                ProbeResult::new(target, ProbeOutcome::Filtered, timestamp, latency)
                    .with_error(ScanError::Timeout)
            }
            Ok(Ok(outcome)) => ProbeResult::new(target, outcome, timestamp, latency),
            Ok(Err(e)) => {
                ProbeResult::new(target, ProbeOutcome::Error, timestamp, latency).with_error(e)
            }
            Err(e) => ProbeResult::new(target, ProbeOutcome::Error, timestamp, latency)
                .with_error(ScanError::RawSocketError(format!("probe task failed: {}", e))),
        }
    }
}

/// Build a TCP SYN segment into `buffer`.
fn build_syn_packet<'a>(
    buffer: &'a mut [u8],
    source: Ipv4Addr,
    destination: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
) -> ScanResult<MutableTcpPacket<'a>> {
    let mut tcp_packet = MutableTcpPacket::new(buffer)
        .ok_or_else(|| ScanError::InvalidPacket("buffer too small for TCP header".to_string()))?;

    tcp_packet.set_source(source_port);
    tcp_packet.set_destination(dest_port);
    tcp_packet.set_sequence(rand::random());
    tcp_packet.set_acknowledgement(0);
    tcp_packet.set_data_offset(5);
    tcp_packet.set_reserved(0);
    tcp_packet.set_flags(TcpFlags::SYN);
    tcp_packet.set_window(1024);
    tcp_packet.set_urgent_ptr(0);

    let checksum = tcp::ipv4_checksum(&tcp_packet.to_immutable(), &source, &destination);
    tcp_packet.set_checksum(checksum);

    Ok(tcp_packet)
}

/// Map reply flags to an outcome; `None` for segments that say nothing.
fn classify_reply(reply: &TcpPacket<'_>) -> Option<ProbeOutcome> {
    let flags = reply.get_flags();
    if flags & (TcpFlags::SYN | TcpFlags::ACK) == (TcpFlags::SYN | TcpFlags::ACK) {
        return Some(ProbeOutcome::Open);
    }
    if flags & TcpFlags::RST != 0 {
        return Some(ProbeOutcome::Closed);
    }
    None
}

/// Pick the local address the kernel would route `destination` through.
///
/// Connecting a UDP socket sends nothing but binds the route.
fn source_ip_for(destination: Ipv4Addr) -> ScanResult<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((destination, 80))?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(ScanError::InvalidConfig(format!(
            "no IPv4 route to {} (got {})",
            destination, ip
        ))),
    }
}

fn open_error(e: std::io::Error) -> ScanError {
    if e.kind() == ErrorKind::PermissionDenied || e.raw_os_error() == Some(libc::EPERM) {
        ScanError::PermissionDenied("raw socket access requires root/sudo privileges".to_string())
    } else {
        ScanError::RawSocketError(e.to_string())
    }
}

/// Parse a segment's flags as seen on the wire.
#[cfg(test)]
fn reply_outcome(segment: &[u8]) -> Option<ProbeOutcome> {
    TcpPacket::new(segment).and_then(|packet| classify_reply(&packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_syn_packet() {
        let mut buffer = [0u8; TCP_HEADER_LEN];
        let source = Ipv4Addr::new(10, 0, 0, 2);
        let destination = Ipv4Addr::new(10, 0, 0, 1);
        let packet = build_syn_packet(&mut buffer, source, destination, 10_001, 443).unwrap();

        assert_eq!(packet.get_source(), 10_001);
        assert_eq!(packet.get_destination(), 443);
        assert_eq!(packet.get_flags(), TcpFlags::SYN);
        let expected = tcp::ipv4_checksum(&packet.to_immutable(), &source, &destination);
        assert_eq!(packet.get_checksum(), expected);
    }

    #[test]
    fn test_reply_classification() {
        let mut buffer = [0u8; TCP_HEADER_LEN];
        {
            let mut packet = MutableTcpPacket::new(&mut buffer).unwrap();
            packet.set_data_offset(5);
            packet.set_flags(TcpFlags::SYN | TcpFlags::ACK);
        }
        assert_eq!(reply_outcome(&buffer), Some(ProbeOutcome::Open));

        MutableTcpPacket::new(&mut buffer)
            .unwrap()
            .set_flags(TcpFlags::RST | TcpFlags::ACK);
        assert_eq!(reply_outcome(&buffer), Some(ProbeOutcome::Closed));

        MutableTcpPacket::new(&mut buffer).unwrap().set_flags(TcpFlags::ACK);
        assert_eq!(reply_outcome(&buffer), None);
    }

    #[test]
    fn test_scanner_creation_needs_privilege() {
        // Only root can open the raw socket; either way no panic.
        match SynScanner::new(10_000, Duration::from_millis(100)) {
            Ok(scanner) => assert_eq!(scanner.name(), "syn"),
            Err(e) => assert!(matches!(
                e,
                ScanError::PermissionDenied(_) | ScanError::RawSocketError(_)
            )),
        }
    }
}
