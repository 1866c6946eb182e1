//! Probe abstraction and report data model.
//!
//! Defines the per-port result, the assembled report and the `Probe`
//! trait the engine fans out over, enabling easier testing.

use crate::services::UNKNOWN_SERVICE;
use crate::tls::TlsCertificateInfo;
use crate::types::{PortRange, ScanId, Target};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    /// A TCP connection was established.
    Open,
    /// Connection refused, timed out or unreachable.
    Closed,
    /// The probe itself could not be completed.
    Error,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of probing a single port. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProbeResult {
    /// The port number that was probed.
    pub port: u16,
    /// State determined by the probe.
    pub state: PortState,
    /// Service label, possibly annotated with a banner in parentheses.
    pub service: String,
    /// Certificate metadata for TLS-family services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_info: Option<TlsCertificateInfo>,
}

impl PortProbeResult {
    /// An open port with its (possibly annotated) service label.
    pub fn open(port: u16, service: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Open,
            service: service.into(),
            tls_info: None,
        }
    }

    /// A closed port.
    pub fn closed(port: u16) -> Self {
        Self {
            port,
            state: PortState::Closed,
            service: UNKNOWN_SERVICE.to_string(),
            tls_info: None,
        }
    }

    /// A port whose probe could not be completed.
    pub fn error(port: u16) -> Self {
        Self {
            port,
            state: PortState::Error,
            service: UNKNOWN_SERVICE.to_string(),
            tls_info: None,
        }
    }

    /// Attach TLS inspection output.
    pub fn with_tls_info(mut self, info: Option<TlsCertificateInfo>) -> Self {
        self.tls_info = info;
        self
    }

    /// Check if the port is open.
    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

/// The outcome of one engine invocation, ordered ascending by port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Identifier for log and cache correlation.
    pub id: ScanId,
    /// The validated target.
    pub target: Target,
    /// Address the probes connected to, if resolution succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// The requested range.
    pub port_range: PortRange,
    /// When the scan was started.
    pub started_at: DateTime<Utc>,
    /// Total scan duration in milliseconds.
    pub duration_ms: u64,
    /// One entry per port in `port_range`, sorted ascending.
    pub results: Vec<PortProbeResult>,
}

impl ScanReport {
    /// Results whose state is open.
    pub fn open_results(&self) -> impl Iterator<Item = &PortProbeResult> {
        self.results.iter().filter(|r| r.is_open())
    }

    pub fn open_ports(&self) -> usize {
        self.count(PortState::Open)
    }

    pub fn closed_ports(&self) -> usize {
        self.count(PortState::Closed)
    }

    pub fn error_ports(&self) -> usize {
        self.count(PortState::Error)
    }

    fn count(&self, state: PortState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    /// Get a short summary of the scan.
    pub fn summary(&self) -> String {
        format!(
            "{} - {} open, {} closed, {} error [{:.2}s]",
            self.target,
            self.open_ports(),
            self.closed_ports(),
            self.error_ports(),
            self.duration_ms as f64 / 1000.0
        )
    }
}

/// A single-port probe.
///
/// Implementations own every resource they acquire for the duration of
/// one call and share no mutable state with sibling calls.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe one port. Never fails: faults are encoded in the result.
    async fn probe(&self, port: u16) -> PortProbeResult;
}
