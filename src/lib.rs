//! # portsight - single-host network reconnaissance
//!
//! portsight probes a range of TCP ports on one host, names the service
//! behind every open port from the well-known-port registry and from
//! protocol banners, and extracts certificate metadata from TLS services.
//!
//! ## Features
//!
//! - **Bounded fan-out**: one connect probe per port, a configurable number in flight
//! - **Service fingerprinting**: SSH/FTP greetings and HTTP server headers
//! - **TLS inspection**: issuer, subject, validity, protocol and cipher
//! - **Partial-failure tolerance**: network faults become per-port states, never scan errors
//! - **Report cache** with a time-to-live, and optional hosted security analysis
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use portsight::scanner::{ReconEngine, ScanOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ReconEngine::new(ScanOptions::default())?;
//!     let report = engine.scan("example.com", "1-1024").await?;
//!
//!     for result in report.open_results() {
//!         println!("{} {}", result.port, result.service);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Validated targets, port ranges and scan identifiers
//! - [`scanner`] - The reconnaissance engine, the `Probe` trait and the TCP prober
//! - [`banner`] - Protocol-aware banner grabbing
//! - [`tls`] - Certificate inspection
//! - [`services`] - Port to service-name registry
//! - [`storage`] - TTL report cache
//! - [`analysis`] - Best-effort hosted security analysis
//! - [`config`] - Settings and XDG paths
//! - [`error`] - Error types
//! - [`output`] - Output formatting utilities

pub mod analysis;
pub mod banner;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scanner;
pub mod services;
pub mod storage;
pub mod tls;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ValidationError};
pub use scanner::{PortProbeResult, PortState, Probe, ReconEngine, ScanOptions, ScanReport};
pub use tls::TlsCertificateInfo;
pub use types::{PortRange, ScanId, Target};
