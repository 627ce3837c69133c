//! Scanner module: range scan orchestration and its result types

pub mod engine;
pub mod range;

use crate::network::PortState;
use serde::{Deserialize, Serialize};

pub use engine::RangeScanner;
pub use range::{parse_port_field, parse_range_fields, PortRange};

/// Outcome of probing one port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub port: u16,
    pub reachable: bool,
}

impl ProbeResult {
    pub fn state(&self) -> PortState {
        PortState::from(self.reachable)
    }
}

/// Open and closed ports of one range scan
///
/// Both lists are strictly ascending and together hold every scanned port
/// exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub open_ports: Vec<u16>,
    pub closed_ports: Vec<u16>,
}

impl ScanSummary {
    /// Total number of ports covered
    pub fn total(&self) -> usize {
        self.open_ports.len() + self.closed_ports.len()
    }

    pub fn open_count(&self) -> usize {
        self.open_ports.len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed_ports.len()
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.open_ports.binary_search(&port).is_ok()
    }

    /// Open and closed shares in percent, `(0.0, 0.0)` when nothing was scanned
    pub fn proportions(&self) -> (f64, f64) {
        let total = self.total();
        if total == 0 {
            return (0.0, 0.0);
        }
        let open = self.open_count() as f64 * 100.0 / total as f64;
        (open, 100.0 - open)
    }
}

/// Result of a scan cut short by a deadline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialScan {
    /// Ports whose probes finished before the deadline
    pub summary: ScanSummary,
    /// Ports never probed or abandoned mid-probe, ascending
    pub unprobed: Vec<u16>,
}

impl PartialScan {
    pub fn is_complete(&self) -> bool {
        self.unprobed.is_empty()
    }
}

/// Fold one-slot-per-port outcomes into ordered sequences
///
/// `slots[i]` belongs to port `range.start() + i`. Walking the slots in index
/// order is what makes the output ascending, whatever order the probes
/// finished in.
pub(crate) fn partition(range: PortRange, slots: &[Option<bool>]) -> PartialScan {
    debug_assert_eq!(slots.len(), range.len());

    let mut scan = PartialScan::default();
    for (port, slot) in range.iter().zip(slots) {
        match slot {
            Some(true) => scan.summary.open_ports.push(port),
            Some(false) => scan.summary.closed_ports.push(port),
            None => scan.unprobed.push(port),
        }
    }
    scan
}
