//! Validated inclusive port ranges and the text-field parsing that feeds them

use crate::error::{RangeValidationError, MAX_PORT};
use crate::ScanError;
use serde::Serialize;
use std::fmt;
use std::num::IntErrorKind;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Closed interval `[start, end]` of TCP ports with `start <= end`
///
/// Only obtainable through validation, so holding one means the range is
/// scannable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validate a numeric pair as typed by a user
    pub fn new(start: i64, end: i64) -> Result<Self, RangeValidationError> {
        if start < 0 {
            return Err(RangeValidationError::StartBelowZero(start));
        }
        if end > MAX_PORT {
            return Err(RangeValidationError::EndAboveMax(end));
        }
        if start > end {
            return Err(RangeValidationError::Inverted { start, end });
        }

        // Both bounds now sit inside 0..=65535.
        Ok(Self {
            start: start as u16,
            end: end as u16,
        })
    }

    /// Range holding exactly one port
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range (never zero)
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Every port in the range, ascending, both bounds included
    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    /// Position of `port` inside the range
    pub(crate) fn offset(&self, port: u16) -> usize {
        usize::from(port - self.start)
    }
}

impl IntoIterator for PortRange {
    type Item = u16;
    type IntoIter = RangeInclusive<u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parses `"80"` or `"1-1024"`
impl FromStr for PortRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // A leading '-' belongs to a negative start, not to the separator.
        let split = s
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i);

        let (start, end) = match split {
            Some(i) => (parse_port_field(&s[..i])?, parse_port_field(&s[i + 1..])?),
            None => {
                let port = parse_port_field(s)?;
                (port, port)
            }
        };

        Ok(PortRange::new(start, end)?)
    }
}

/// Parse one free-text port field into a number
///
/// Out-of-range numbers are accepted here so that range validation can
/// report them; only non-integers fail. Integers too large for `i64`
/// saturate, which still lands them outside `0..=65535`.
pub fn parse_port_field(text: &str) -> crate::Result<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ScanError::Parse(
            "please enter valid numbers for ports (field is empty)".to_string(),
        ));
    }
    match text.parse::<i64>() {
        Ok(value) => Ok(value),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(e.into()),
        },
    }
}

/// Turn the two port fields of the input form into a validated range
pub fn parse_range_fields(start: &str, end: &str) -> crate::Result<PortRange> {
    let start = parse_port_field(start)?;
    let end = parse_port_field(end)?;
    Ok(PortRange::new(start, end)?)
}
