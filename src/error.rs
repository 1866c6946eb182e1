//! Error types for portsight.
//!
//! Uses `thiserror` for ergonomic error definitions. Only
//! [`ValidationError`] crosses the engine boundary; every network fault
//! during a scan is recorded as data inside the report.

use crate::types::{PortRangeError, TargetError};
use std::path::PathBuf;
use thiserror::Error;

/// Client-input fault raised before any network I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("invalid port range: {0}")]
    PortRange(#[from] PortRangeError),
}

/// Classification of a failed TCP connect.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connection refused")]
    Refused,

    #[error("connection timed out")]
    Timeout,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("socket error: {0}")]
    Other(#[from] std::io::Error),
}

impl ConnectError {
    /// Whether the fault means "host answered or stayed silent, port shut"
    /// rather than "probe could not be completed".
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Refused | Self::Timeout | Self::Unreachable(_))
    }
}

/// Failure to turn a hostname into an address. Recorded per port, never
/// returned from a scan.
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("failed to resolve hostname '{0}': {1}")]
    LookupFailed(String, String),

    #[error("no IP addresses found for hostname '{0}'")]
    NoAddresses(String),
}

/// Errors for settings and paths.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a home directory for configuration")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("invalid setting: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors for the report cache.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cache directory error: {0}")]
    DirectoryError(String),

    #[error("failed to load cache: {0}")]
    LoadFailed(String),

    #[error("failed to save cache: {0}")]
    SaveFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a single analysis backend. Never escapes the analyzer.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service returned status {0}")]
    Status(u16),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Top-level error for CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type CliResult<T> = Result<T, CliError>;
