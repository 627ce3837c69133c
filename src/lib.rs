//! portscope - TCP port range reachability scanner
//!
//! Probes every port of an inclusive range on one host with a bounded number
//! of concurrent TCP connect attempts and reports which ports accepted a
//! connection, in ascending port order.

pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::{RangeValidationError, ScanError, MAX_PORT};
pub use network::{
    CounterSource, PortProbe, PortState, SystemCounters, TcpConnectProbe, TrafficCounters,
    TrafficMonitor, TrafficSample,
};
pub use output::ScanReport;
pub use scanner::{PartialScan, PortRange, ProbeResult, RangeScanner, ScanSummary};

pub type Result<T> = std::result::Result<T, ScanError>;
