//! TLS certificate inspection.
//!
//! Performs a verified TLS handshake (webpki roots, hostname checked via
//! SNI) and extracts leaf certificate metadata together with the
//! negotiated protocol version and cipher suite. Failures never
//! propagate: they are classified and returned as [`TlsCertificateInfo::Invalid`].

use chrono::{DateTime, NaiveDate};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ProtocolVersion, RootCertStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use x509_parser::prelude::*;

/// Default bound on connect plus handshake.
pub const DEFAULT_TLS_TIMEOUT: Duration = Duration::from_secs(3);

/// Metadata of a successfully verified certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub issuer_organization: String,
    pub subject_common_name: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub protocol_version: String,
    pub cipher_suite: String,
}

/// Coarse classification of a failed inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsErrorKind {
    /// The TLS layer rejected the peer (bad certificate, alert, garbage).
    Protocol,
    /// The TCP connection was refused, reset or timed out.
    Connection,
    /// Anything else (unusable server name, unparsable certificate).
    Other,
}

impl fmt::Display for TlsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol => write!(f, "TLS error"),
            Self::Connection => write!(f, "Connection error"),
            Self::Other => write!(f, "Error"),
        }
    }
}

/// Why an inspection failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFailure {
    pub kind: TlsErrorKind,
    pub message: String,
}

impl TlsFailure {
    fn new(kind: TlsErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for TlsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of inspecting one TLS endpoint.
///
/// Serializes flat, with a `valid` flag and either the certificate
/// fields or `error_kind`/`error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TlsInfoRepr", try_from = "TlsInfoRepr")]
pub enum TlsCertificateInfo {
    Valid(CertificateDetails),
    Invalid(TlsFailure),
}

impl TlsCertificateInfo {
    /// Whether the handshake and verification succeeded.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn details(&self) -> Option<&CertificateDetails> {
        match self {
            Self::Valid(details) => Some(details),
            Self::Invalid(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TlsFailure> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(failure) => Some(failure),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TlsInfoRepr {
    valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer_organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    valid_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    valid_until: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cipher_suite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<TlsErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<TlsCertificateInfo> for TlsInfoRepr {
    fn from(info: TlsCertificateInfo) -> Self {
        match info {
            TlsCertificateInfo::Valid(d) => Self {
                valid: true,
                issuer_organization: Some(d.issuer_organization),
                subject_common_name: Some(d.subject_common_name),
                valid_from: Some(d.valid_from),
                valid_until: Some(d.valid_until),
                protocol_version: Some(d.protocol_version),
                cipher_suite: Some(d.cipher_suite),
                error_kind: None,
                error: None,
            },
            TlsCertificateInfo::Invalid(f) => Self {
                valid: false,
                issuer_organization: None,
                subject_common_name: None,
                valid_from: None,
                valid_until: None,
                protocol_version: None,
                cipher_suite: None,
                error_kind: Some(f.kind),
                error: Some(f.message),
            },
        }
    }
}

impl TryFrom<TlsInfoRepr> for TlsCertificateInfo {
    type Error = String;

    fn try_from(repr: TlsInfoRepr) -> Result<Self, Self::Error> {
        if !repr.valid {
            return Ok(Self::Invalid(TlsFailure {
                kind: repr.error_kind.unwrap_or(TlsErrorKind::Other),
                message: repr.error.unwrap_or_default(),
            }));
        }

        let missing = |field: &str| format!("valid certificate info is missing '{}'", field);
        Ok(Self::Valid(CertificateDetails {
            issuer_organization: repr.issuer_organization.ok_or_else(|| missing("issuer_organization"))?,
            subject_common_name: repr.subject_common_name.ok_or_else(|| missing("subject_common_name"))?,
            valid_from: repr.valid_from.ok_or_else(|| missing("valid_from"))?,
            valid_until: repr.valid_until.ok_or_else(|| missing("valid_until"))?,
            protocol_version: repr.protocol_version.ok_or_else(|| missing("protocol_version"))?,
            cipher_suite: repr.cipher_suite.ok_or_else(|| missing("cipher_suite"))?,
        }))
    }
}

/// Opens verified TLS connections and reports certificate metadata.
#[derive(Clone)]
pub struct CertificateInspector {
    connector: TlsConnector,
    timeout: Duration,
}

impl fmt::Debug for CertificateInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateInspector")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CertificateInspector {
    /// Build an inspector trusting the webpki root set.
    pub fn new(timeout: Duration) -> Result<Self, rustls::Error> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(roots, timeout)
    }

    /// Build an inspector trusting only `roots`.
    pub fn with_roots(roots: RootCertStore, timeout: Duration) -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }

    /// Inspect `host:port`, resolving `host` through the system resolver.
    pub async fn inspect(&self, host: &str, port: u16) -> TlsCertificateInfo {
        let result = timeout(self.timeout, async {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| classify_io(&e))?;
            self.handshake(host, stream).await
        })
        .await;
        self.finish(host, port, result)
    }

    /// Inspect an already resolved address, verifying against `host`.
    pub async fn inspect_addr(&self, host: &str, addr: SocketAddr) -> TlsCertificateInfo {
        let result = timeout(self.timeout, async {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| classify_io(&e))?;
            self.handshake(host, stream).await
        })
        .await;
        self.finish(host, addr.port(), result)
    }

    fn finish(
        &self,
        host: &str,
        port: u16,
        result: Result<Result<CertificateDetails, TlsFailure>, tokio::time::error::Elapsed>,
    ) -> TlsCertificateInfo {
        let outcome = result.unwrap_or_else(|_| {
            Err(TlsFailure::new(
                TlsErrorKind::Connection,
                format!("handshake timed out after {:?}", self.timeout),
            ))
        });

        match outcome {
            Ok(details) => {
                debug!(
                    host,
                    port,
                    issuer = %details.issuer_organization,
                    version = %details.protocol_version,
                    "certificate inspected"
                );
                TlsCertificateInfo::Valid(details)
            }
            Err(failure) => {
                warn!(host, port, kind = ?failure.kind, error = %failure.message, "TLS inspection failed");
                TlsCertificateInfo::Invalid(failure)
            }
        }
    }

    async fn handshake(&self, host: &str, stream: TcpStream) -> Result<CertificateDetails, TlsFailure> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| TlsFailure::new(TlsErrorKind::Other, format!("invalid server name: {}", e)))?;

        let tls_stream = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| classify_io(&e))?;

        let (_, connection) = tls_stream.get_ref();
        let protocol_version = connection
            .protocol_version()
            .map(protocol_name)
            .unwrap_or_else(|| "unknown".to_string());
        let cipher_suite = connection
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()))
            .unwrap_or_else(|| "unknown".to_string());
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| TlsFailure::new(TlsErrorKind::Other, "peer sent no certificate"))?;

        let (_, cert) = parse_x509_certificate(leaf.as_ref()).map_err(|e| {
            TlsFailure::new(TlsErrorKind::Other, format!("X.509 parse error: {}", e))
        })?;

        let issuer_organization = cert
            .issuer()
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .unwrap_or("Unknown")
            .to_string();
        let subject_common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .unwrap_or(host)
            .to_string();

        let validity = cert.validity();
        Ok(CertificateDetails {
            issuer_organization,
            subject_common_name,
            valid_from: asn1_date(&validity.not_before)?,
            valid_until: asn1_date(&validity.not_after)?,
            protocol_version,
            cipher_suite,
        })
    }
}

fn asn1_date(time: &ASN1Time) -> Result<NaiveDate, TlsFailure> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| TlsFailure::new(TlsErrorKind::Other, "certificate date out of range"))
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        other => format!("{:?}", other),
    }
}

/// Sort an I/O fault into protocol, connection or other.
fn classify_io(e: &io::Error) -> TlsFailure {
    if e.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
        return TlsFailure::new(TlsErrorKind::Protocol, e);
    }

    let kind = match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::TimedOut
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::AddrNotAvailable => TlsErrorKind::Connection,
        _ if e.to_string().to_lowercase().contains("unreachable") => TlsErrorKind::Connection,
        _ => TlsErrorKind::Other,
    };
    TlsFailure::new(kind, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        date_time_ymd, BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa,
        KeyPair, KeyUsagePurpose,
    };
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::ServerConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    const TEST_CA_ORG: &str = "Portsight Test CA";

    fn inspector() -> CertificateInspector {
        CertificateInspector::new(Duration::from_millis(500)).unwrap()
    }

    /// A throwaway CA and a `localhost` leaf it signed.
    struct TestPki {
        roots: RootCertStore,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    }

    fn test_pki(leaf_cn: Option<&str>) -> TestPki {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        ca_params.distinguished_name = DistinguishedName::new();
        ca_params.distinguished_name.push(DnType::OrganizationName, TEST_CA_ORG);
        ca_params.distinguished_name.push(DnType::CommonName, "Portsight Test Root");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        leaf_params.distinguished_name = DistinguishedName::new();
        if let Some(cn) = leaf_cn {
            leaf_params.distinguished_name.push(DnType::CommonName, cn);
        }
        leaf_params.not_before = date_time_ymd(2024, 1, 1);
        leaf_params.not_after = date_time_ymd(2099, 12, 31);
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(ca_cert.der().clone()).unwrap();

        TestPki {
            roots,
            chain: vec![leaf_cert.der().clone(), ca_cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
        }
    }

    /// Serve one TLS handshake with `pki`'s leaf on an ephemeral port.
    async fn serve_tls_once(pki: &TestPki) -> SocketAddr {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(pki.chain.clone(), pki.key.clone_key())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let mut buf = [0u8; 64];
                    let _ = tls.read(&mut buf).await;
                }
            }
        });
        addr
    }

    fn trusting(pki: &TestPki) -> CertificateInspector {
        CertificateInspector::with_roots(pki.roots.clone(), Duration::from_secs(2)).unwrap()
    }

    fn sample_details() -> CertificateDetails {
        CertificateDetails {
            issuer_organization: "Let's Encrypt".to_string(),
            subject_common_name: "example.com".to_string(),
            valid_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            protocol_version: "TLSv1.3".to_string(),
            cipher_suite: "TLS13_AES_256_GCM_SHA384".to_string(),
        }
    }

    #[test]
    fn test_classify_rustls_error() {
        let e = io::Error::new(io::ErrorKind::InvalidData, rustls::Error::DecryptError);
        assert_eq!(classify_io(&e).kind, TlsErrorKind::Protocol);
    }

    #[test]
    fn test_classify_connection_errors() {
        for kind in [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut,
        ] {
            assert_eq!(classify_io(&io::Error::from(kind)).kind, TlsErrorKind::Connection);
        }
        assert_eq!(
            classify_io(&io::Error::from(io::ErrorKind::PermissionDenied)).kind,
            TlsErrorKind::Other
        );
    }

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_3), "TLSv1.3");
        assert_eq!(protocol_name(ProtocolVersion::TLSv1_2), "TLSv1.2");
    }

    #[test]
    fn test_valid_info_serializes_flat() {
        let info = TlsCertificateInfo::Valid(sample_details());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["issuer_organization"], "Let's Encrypt");
        assert_eq!(json["valid_from"], "2024-01-01");
        assert!(json.get("error_kind").is_none());

        let parsed: TlsCertificateInfo = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_invalid_info_serializes_flat() {
        let info = TlsCertificateInfo::Invalid(TlsFailure::new(TlsErrorKind::Connection, "refused"));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "error_kind": "connection", "error": "refused"}));
    }

    #[test]
    fn test_incomplete_valid_info_is_rejected() {
        let result = serde_json::from_str::<TlsCertificateInfo>(r#"{"valid": true}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_verified_certificate_details() {
        let pki = test_pki(Some("portsight.test"));
        let addr = serve_tls_once(&pki).await;

        let info = trusting(&pki).inspect_addr("localhost", addr).await;
        let details = info.details().expect("handshake should verify");
        assert!(info.is_valid());
        assert_eq!(details.issuer_organization, TEST_CA_ORG);
        assert_eq!(details.subject_common_name, "portsight.test");
        assert_eq!(details.valid_from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(details.valid_until, NaiveDate::from_ymd_opt(2099, 12, 31).unwrap());
        let today = chrono::Utc::now().date_naive();
        assert!(details.valid_from <= today && today <= details.valid_until);
        assert_eq!(details.protocol_version, "TLSv1.3");
        assert!(details.cipher_suite.starts_with("TLS13_"));
    }

    #[tokio::test]
    async fn test_missing_common_name_falls_back_to_host() {
        let pki = test_pki(None);
        let addr = serve_tls_once(&pki).await;

        let info = trusting(&pki).inspect("localhost", addr.port()).await;
        let details = info.details().expect("handshake should verify");
        assert_eq!(details.subject_common_name, "localhost");
        assert_eq!(details.issuer_organization, TEST_CA_ORG);
    }

    #[tokio::test]
    async fn test_untrusted_issuer_is_protocol_error() {
        let pki = test_pki(Some("portsight.test"));
        let addr = serve_tls_once(&pki).await;

        let info = inspector().inspect_addr("localhost", addr).await;
        assert_eq!(info.failure().unwrap().kind, TlsErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_closed_port_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let info = inspector().inspect_addr("localhost", addr).await;
        assert!(!info.is_valid());
        assert_eq!(info.failure().unwrap().kind, TlsErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_plaintext_peer_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        let info = inspector().inspect_addr("localhost", addr).await;
        assert_eq!(info.failure().unwrap().kind, TlsErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(2)).await;
                drop(stream);
            }
        });

        let info = inspector().inspect_addr("localhost", addr).await;
        let failure = info.failure().unwrap();
        assert_eq!(failure.kind, TlsErrorKind::Connection);
        assert!(failure.message.contains("timed out"));
    }
}
