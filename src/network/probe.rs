//! TCP connect probing for a single (host, port) pair

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

/// Per-probe timeout when the caller has no opinion
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// One bounded-time reachability check
///
/// Implementations make a single attempt, never retry, and must return
/// within `timeout`. Every failure mode collapses to `false`.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Why a single connection attempt did not succeed
///
/// Only used inside the crate; callers of [`PortProbe::probe`] see `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeFailure {
    TimedOut,
    Refused,
    Resolve,
    PermissionDenied,
    Io(io::ErrorKind),
}

impl From<io::Error> for ProbeFailure {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ProbeFailure::Refused,
            io::ErrorKind::TimedOut => ProbeFailure::TimedOut,
            io::ErrorKind::PermissionDenied => ProbeFailure::PermissionDenied,
            kind => ProbeFailure::Io(kind),
        }
    }
}

/// TCP connect scanner for non-raw socket scanning
///
/// Resolution and the handshake share one timeout, so a slow resolver cannot
/// stretch a probe past its budget. The stream is dropped as soon as the
/// handshake completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

impl TcpConnectProbe {
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn attempt(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ProbeFailure> {
        match tokio::time::timeout(timeout, connect(host, port)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProbeFailure::TimedOut),
        }
    }
}

/// The one address a probe connects to, IPv4 first
fn pick_address(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

async fn connect(host: &str, port: u16) -> Result<(), ProbeFailure> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|_| ProbeFailure::Resolve)?
        .collect();
    let addr = pick_address(&addrs).ok_or(ProbeFailure::Resolve)?;

    // A single socket per probe, even when the host has several addresses.
    let stream = TcpStream::connect(addr).await?;
    drop(stream);
    Ok(())
}

#[async_trait]
impl PortProbe for TcpConnectProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool {
        self.attempt(host, port, timeout).await.is_ok()
    }
}
