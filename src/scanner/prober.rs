//! TCP connect prober.
//!
//! Opens a full TCP connection per port, classifies the outcome, and for
//! open ports runs the fingerprinter and, for TLS-family services, the
//! certificate inspector. The socket lives only inside one `probe` call
//! and is dropped on every exit path.

use crate::banner::{annotate, Fingerprinter};
use crate::error::ConnectError;
use crate::scanner::traits::{PortProbeResult, Probe};
use crate::scanner::TlsTrigger;
use crate::services::ServiceRegistry;
use crate::tls::CertificateInspector;
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Probes ports of one resolved target.
pub struct TcpProber {
    host: String,
    ip: IpAddr,
    connect_timeout: Duration,
    registry: Arc<ServiceRegistry>,
    fingerprinter: Fingerprinter,
    inspector: CertificateInspector,
    tls_trigger: TlsTrigger,
}

impl TcpProber {
    /// Create a prober for `host`, connecting to `ip`.
    ///
    /// `host` is used for the HTTP `Host` header and TLS server name.
    pub fn new(
        host: impl Into<String>,
        ip: IpAddr,
        connect_timeout: Duration,
        registry: Arc<ServiceRegistry>,
        fingerprinter: Fingerprinter,
        inspector: CertificateInspector,
        tls_trigger: TlsTrigger,
    ) -> Self {
        Self {
            host: host.into(),
            ip,
            connect_timeout,
            registry,
            fingerprinter,
            inspector,
            tls_trigger,
        }
    }

    /// Attempt to connect to the target address.
    async fn attempt_connect(&self, addr: SocketAddr) -> Result<TcpStream, ConnectError> {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(classify_connect_error(e)),
            Err(_) => Err(ConnectError::Timeout),
        }
    }
}

#[async_trait]
impl Probe for TcpProber {
    async fn probe(&self, port: u16) -> PortProbeResult {
        let addr = SocketAddr::new(self.ip, port);

        let mut stream = match self.attempt_connect(addr).await {
            Ok(stream) => stream,
            Err(e) if e.is_closed() => {
                debug!(port, reason = %e, "port closed");
                return PortProbeResult::closed(port);
            }
            Err(e) => {
                debug!(port, error = %e, "probe failed");
                return PortProbeResult::error(port);
            }
        };

        let service = self.registry.describe(port).to_string();
        let banner = self
            .fingerprinter
            .fingerprint(&mut stream, &service, &self.host)
            .await;
        drop(stream);

        let tls_info = if self.tls_trigger.applies(&service) {
            Some(self.inspector.inspect_addr(&self.host, addr).await)
        } else {
            None
        };

        let label = annotate(&service, &banner);
        debug!(port, service = %label, "port open");
        PortProbeResult::open(port, label).with_tls_info(tls_info)
    }
}

/// Map a connect failure onto closed-port causes or a genuine socket fault.
fn classify_connect_error(e: io::Error) -> ConnectError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ConnectError::Refused,
        io::ErrorKind::TimedOut => ConnectError::Timeout,
        _ => {
            let message = e.to_string();
            let lower = message.to_lowercase();
            if lower.contains("unreachable") || lower.contains("no route") {
                ConnectError::Unreachable(message)
            } else {
                ConnectError::Other(e)
            }
        }
    }
}
