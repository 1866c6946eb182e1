//! Port range parsing and validation.
//!
//! A `PortRange` is an inclusive `start-end` pair with both bounds in
//! 0-65535 and `start <= end`. Invalid input is a validation error, never
//! a runtime fault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest valid port number.
pub const MAX_PORT: u32 = 65535;

/// Port range used when the caller does not supply one.
pub const DEFAULT_PORT_RANGE: &str = "1-1024";

/// An inclusive range of TCP ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    start: u16,
    end: u16,
}

/// Error type for port range parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortRangeError {
    #[error("expected '<start>-<end>', got '{0}'")]
    InvalidFormat(String),
    #[error("'{0}' is not a port number")]
    NotANumber(String),
    #[error("port {0} is out of valid range (0-65535)")]
    OutOfRange(u64),
    #[error("start ({0}) is greater than end ({1})")]
    Inverted(u16, u16),
}

impl PortRange {
    /// Create a new port range.
    pub fn new(start: u16, end: u16) -> Result<Self, PortRangeError> {
        if start > end {
            Err(PortRangeError::Inverted(start, end))
        } else {
            Ok(Self { start, end })
        }
    }

    /// Create a range containing a single port.
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// First port of the range.
    pub const fn start(&self) -> u16 {
        self.start
    }

    /// Last port of the range (inclusive).
    pub const fn end(&self) -> u16 {
        self.end
    }

    /// Get the number of ports in this range.
    pub const fn len(&self) -> usize {
        (self.end as usize) - (self.start as usize) + 1
    }

    /// A valid range always has at least one port.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over all ports in this range.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    /// Whether `port` falls inside the range.
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self { start: 1, end: 1024 }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| PortRangeError::InvalidFormat(s.to_string()))?;

        let start = parse_bound(start)?;
        let end = parse_bound(end)?;
        Self::new(start, end)
    }
}

impl TryFrom<String> for PortRange {
    type Error = PortRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

fn parse_bound(raw: &str) -> Result<u16, PortRangeError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(PortRangeError::NotANumber(raw.to_string()));
    }
    // Digits only, so overflow is the only parse failure left
    let value: u64 = raw.parse().unwrap_or(u64::MAX);
    if value > u64::from(MAX_PORT) {
        return Err(PortRangeError::OutOfRange(value));
    }
    Ok(value as u16)
}
