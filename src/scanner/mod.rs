//! Reconnaissance engine.
//!
//! Validates input, resolves the target once, fans out one probe per
//! port under a bounded concurrency limit, and assembles the results
//! into a report sorted ascending by port.

pub mod prober;
pub mod traits;

use crate::banner::Fingerprinter;
use crate::error::{ResolutionError, ValidationError};
use crate::services::ServiceRegistry;
use crate::tls::{CertificateInspector, DEFAULT_TLS_TIMEOUT};
use crate::types::{PortRange, ScanId, Target, DEFAULT_PORT_RANGE};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

pub use prober::TcpProber;
pub use traits::{PortProbeResult, PortState, Probe, ScanReport};

/// Default number of probes in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 256;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Decides which open ports get a TLS certificate inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsTrigger {
    services: Vec<String>,
    all_open: bool,
}

impl TlsTrigger {
    /// Inspect ports whose service is in `services`, or every open port
    /// when `all_open` is set.
    pub fn new(services: Vec<String>, all_open: bool) -> Self {
        Self { services, all_open }
    }

    /// Whether an open port labeled `service` should be inspected.
    pub fn applies(&self, service: &str) -> bool {
        self.all_open || self.services.iter().any(|s| s.eq_ignore_ascii_case(service))
    }
}

impl Default for TlsTrigger {
    fn default() -> Self {
        Self {
            services: vec!["https".to_string(), "https-alt".to_string()],
            all_open: false,
        }
    }
}

/// Tunables for one engine.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum probes in flight.
    pub concurrency: usize,
    /// Bound on each TCP connect.
    pub connect_timeout: Duration,
    /// Bound on each banner read or write.
    pub banner_timeout: Duration,
    /// Bound on connect plus TLS handshake.
    pub tls_timeout: Duration,
    /// Which services get certificate inspection.
    pub tls_trigger: TlsTrigger,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            banner_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls_timeout: DEFAULT_TLS_TIMEOUT,
            tls_trigger: TlsTrigger::default(),
        }
    }
}

impl ScanOptions {
    /// Set the concurrency limit (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the banner I/O timeout.
    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = timeout;
        self
    }

    /// Set the TLS timeout.
    pub fn with_tls_timeout(mut self, timeout: Duration) -> Self {
        self.tls_timeout = timeout;
        self
    }

    /// Set the TLS trigger.
    pub fn with_tls_trigger(mut self, trigger: TlsTrigger) -> Self {
        self.tls_trigger = trigger;
        self
    }
}

/// Entry point for scans. Stateless across scans.
pub struct ReconEngine {
    options: ScanOptions,
    registry: Arc<ServiceRegistry>,
    inspector: CertificateInspector,
    progress: Option<ProgressBar>,
}

impl ReconEngine {
    /// Build an engine using the system service registry.
    pub fn new(options: ScanOptions) -> Result<Self, rustls::Error> {
        let inspector = CertificateInspector::new(options.tls_timeout)?;
        Ok(Self {
            options,
            registry: Arc::new(ServiceRegistry::system()),
            inspector,
            progress: None,
        })
    }

    /// Replace the service registry.
    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Report per-port progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan `raw_target` over `raw_range` (`"<start>-<end>"`).
    ///
    /// Both inputs are validated before any network I/O. Network faults
    /// never fail the scan; they appear as per-port `closed` or `error`
    /// states.
    pub async fn scan(&self, raw_target: &str, raw_range: &str) -> Result<ScanReport, ValidationError> {
        let target = Target::validate(raw_target)?;
        let range: PortRange = raw_range.parse()?;
        Ok(self.scan_validated(target, range).await)
    }

    /// Scan `raw_target` over the default range (1-1024).
    pub async fn scan_default_range(&self, raw_target: &str) -> Result<ScanReport, ValidationError> {
        self.scan(raw_target, DEFAULT_PORT_RANGE).await
    }

    /// Scan an already validated target and range.
    pub async fn scan_validated(&self, target: Target, range: PortRange) -> ScanReport {
        let id = ScanId::new();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(scan_id = %id.short(), host = %target, %range, "starting scan");

        if let Some(pb) = &self.progress {
            pb.set_length(range.len() as u64);
        }

        let (ip, results) = match resolve(&target).await {
            Ok(ip) => {
                let prober = Arc::new(TcpProber::new(
                    target.host(),
                    ip,
                    self.options.connect_timeout,
                    Arc::clone(&self.registry),
                    Fingerprinter::new(self.options.banner_timeout),
                    self.inspector.clone(),
                    self.options.tls_trigger.clone(),
                ));
                let results =
                    fan_out(prober, range, self.options.concurrency, self.progress.as_ref()).await;
                (Some(ip), results)
            }
            Err(e) => {
                warn!(host = %target, error = %e, "target resolution failed, every port marked as error");
                let results: Vec<PortProbeResult> = range.iter().map(PortProbeResult::error).collect();
                if let Some(pb) = &self.progress {
                    pb.inc(results.len() as u64);
                }
                (None, results)
            }
        };

        if let Some(pb) = &self.progress {
            pb.finish_with_message("Scan complete");
        }

        let report = assemble_report(
            id,
            target,
            ip,
            range,
            started_at,
            start.elapsed().as_millis() as u64,
            results,
        );
        info!(scan_id = %id.short(), summary = %report.summary(), "scan finished");
        report
    }
}

/// Resolve the target to one address. IP literals skip the resolver.
pub async fn resolve(target: &Target) -> Result<IpAddr, ResolutionError> {
    let hostname = match target {
        Target::Ip(ip) => return Ok(*ip),
        Target::Hostname(name) => name,
    };

    let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
        warn!(error = %e, "system resolver configuration unavailable, using defaults");
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
    });

    let response = resolver
        .lookup_ip(hostname.as_str())
        .await
        .map_err(|e| ResolutionError::LookupFailed(hostname.clone(), e.to_string()))?;

    response
        .iter()
        .next()
        .ok_or_else(|| ResolutionError::NoAddresses(hostname.clone()))
}

/// Run `probe` once for every port in `range`, at most `concurrency` at a time.
///
/// Each probe runs in its own task so a panic is contained to its port,
/// which is then reported as `error`. Output order is completion order.
pub async fn fan_out<P>(
    probe: Arc<P>,
    range: PortRange,
    concurrency: usize,
    progress: Option<&ProgressBar>,
) -> Vec<PortProbeResult>
where
    P: Probe + 'static,
{
    stream::iter(range.iter())
        .map(|port| {
            let probe = Arc::clone(&probe);
            let progress = progress.cloned();

            async move {
                let result = tokio::spawn(async move { probe.probe(port).await })
                    .await
                    .unwrap_or_else(|e| {
                        warn!(port, error = %e, "probe task failed");
                        PortProbeResult::error(port)
                    });

                if let Some(ref pb) = progress {
                    pb.inc(1);
                    if result.is_open() {
                        pb.set_message(format!("Found open port: {}", port));
                    }
                }

                result
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Order results ascending by port and wrap them in a report.
pub fn assemble_report(
    id: ScanId,
    target: Target,
    ip: Option<IpAddr>,
    port_range: PortRange,
    started_at: chrono::DateTime<Utc>,
    duration_ms: u64,
    mut results: Vec<PortProbeResult>,
) -> ScanReport {
    results.sort_by_key(|r| r.port);
    ScanReport {
        id,
        target,
        ip_address: ip.map(|ip| ip.to_string()),
        port_range,
        started_at,
        duration_ms,
        results,
    }
}
