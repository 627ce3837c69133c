//! Error handling for the portscope scanner
//!
//! Input problems are split in two so the presentation layer can tell them
//! apart: text that is not a number at all ([`ScanError::Parse`]) and numbers
//! that do not form a usable range ([`ScanError::RangeValidation`]). Both are
//! raised before a single probe leaves the host.

use thiserror::Error;

/// Highest valid TCP port number
pub const MAX_PORT: i64 = 65_535;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid input: {0}")]
    Parse(String),

    #[error("Invalid port range: {0}")]
    RangeValidation(#[from] RangeValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Traffic counters unavailable: {0}")]
    Counters(String),
}

impl ScanError {
    /// True for errors caused by what the user typed into the port fields
    pub fn is_input_error(&self) -> bool {
        matches!(self, ScanError::Parse(_) | ScanError::RangeValidation(_))
    }
}

/// Reasons a numeric `(start, end)` pair is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeValidationError {
    #[error("start port {0} is below 0; ports must be between 0 and 65535")]
    StartBelowZero(i64),

    #[error("end port {0} is above 65535; ports must be between 0 and 65535")]
    EndAboveMax(i64),

    #[error("start port {start} is greater than end port {end}")]
    Inverted { start: i64, end: i64 },
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::Parse(format!("please enter valid numbers for ports ({})", e))
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::Config(format!("Failed to parse TOML: {}", e))
    }
}
