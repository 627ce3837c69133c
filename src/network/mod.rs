//! Network module: the per-port TCP probe and the host traffic counters

pub mod probe;
pub mod traffic;

use serde::{Deserialize, Serialize};

pub use probe::{PortProbe, TcpConnectProbe, DEFAULT_PROBE_TIMEOUT};
pub use traffic::{CounterSource, SystemCounters, TrafficCounters, TrafficMonitor, TrafficSample};

/// Port state enumeration
///
/// A connect scan only ever sees two outcomes. Anything short of a completed
/// handshake within the timeout is `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
}

impl From<bool> for PortState {
    fn from(reachable: bool) -> Self {
        if reachable {
            PortState::Open
        } else {
            PortState::Closed
        }
    }
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
        }
    }
}
