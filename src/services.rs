//! Service detection based on well-known port numbers.
//!
//! Lookups consult the system registry (`/etc/services`, tcp entries)
//! first and fall back to a static table of common ports. Ports found in
//! neither report [`UNKNOWN_SERVICE`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Label for ports with no known service, and for closed or failed probes.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Default location of the system services database.
pub const SYSTEM_SERVICES_PATH: &str = "/etc/services";

/// Static map of common ports, used when the system registry has no entry.
static FALLBACK_SERVICES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    m.insert(20, "ftp-data");
    m.insert(21, "ftp");
    m.insert(22, "ssh");
    m.insert(23, "telnet");
    m.insert(25, "smtp");
    m.insert(53, "dns");
    m.insert(80, "http");
    m.insert(110, "pop3");
    m.insert(143, "imap");
    m.insert(389, "ldap");
    m.insert(443, "https");
    m.insert(445, "microsoft-ds");
    m.insert(465, "smtps");
    m.insert(587, "submission");
    m.insert(636, "ldaps");
    m.insert(993, "imaps");
    m.insert(995, "pop3s");
    m.insert(1433, "mssql");
    m.insert(1521, "oracle");
    m.insert(2049, "nfs");
    m.insert(3306, "mysql");
    m.insert(3389, "rdp");
    m.insert(5432, "postgresql");
    m.insert(5601, "kibana");
    m.insert(5900, "vnc");
    m.insert(6000, "x11");
    m.insert(6379, "redis");
    m.insert(8080, "http-alt");
    m.insert(8443, "https-alt");
    m.insert(9090, "prometheus");
    m.insert(9100, "node-exporter");
    m.insert(9200, "elasticsearch");
    m.insert(11211, "memcached");
    m.insert(27015, "steam");
    m.insert(27017, "mongodb");

    m
});

/// Look up a port in the static fallback table only.
pub fn fallback_service_name(port: u16) -> Option<&'static str> {
    FALLBACK_SERVICES.get(&port).copied()
}

/// Port-to-name registry combining the system database and the fallback table.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    system: HashMap<u16, String>,
}

impl ServiceRegistry {
    /// Registry backed by the fallback table only.
    pub fn fallback_only() -> Self {
        Self::default()
    }

    /// Load the system registry, degrading to the fallback table when the
    /// file is missing or unreadable.
    pub fn system() -> Self {
        Self::from_file(Path::new(SYSTEM_SERVICES_PATH))
    }

    /// Load a registry from a services(5)-format file.
    pub fn from_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                let registry = Self::parse(&content);
                debug!(
                    path = %path.display(),
                    entries = registry.system.len(),
                    "loaded system service registry"
                );
                registry
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "system service registry unavailable");
                Self::fallback_only()
            }
        }
    }

    /// Parse services(5) content, keeping the first tcp name per port.
    pub fn parse(content: &str) -> Self {
        let mut system = HashMap::new();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, proto)) = port_proto.split_once('/') else {
                continue;
            };
            if !proto.eq_ignore_ascii_case("tcp") {
                continue;
            }
            if let Ok(port) = port.parse::<u16>() {
                system.entry(port).or_insert_with(|| name.to_string());
            }
        }

        Self { system }
    }

    /// Canonical service name for `port`, if either source knows it.
    pub fn lookup(&self, port: u16) -> Option<&str> {
        self.system
            .get(&port)
            .map(String::as_str)
            .or_else(|| fallback_service_name(port))
    }

    /// Service name for `port`, or [`UNKNOWN_SERVICE`].
    pub fn describe(&self, port: u16) -> &str {
        self.lookup(port).unwrap_or(UNKNOWN_SERVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# Network services, Internet style
tcpmux\t\t1/tcp\t\t\t\t# TCP port service multiplexer
ssh\t\t22/tcp\t\t\t\t# SSH Remote Login Protocol
domain\t\t53/tcp\t\t\t\t# Domain Name Server
domain\t\t53/udp
http\t\t80/tcp\t\twww\t\t# WorldWideWeb HTTP
snmp\t\t161/udp
";

    #[test]
    fn test_common_fallback_ports() {
        assert_eq!(fallback_service_name(22), Some("ssh"));
        assert_eq!(fallback_service_name(80), Some("http"));
        assert_eq!(fallback_service_name(443), Some("https"));
        assert_eq!(fallback_service_name(8443), Some("https-alt"));
        assert_eq!(fallback_service_name(3306), Some("mysql"));
    }

    #[test]
    fn test_unknown_port() {
        let registry = ServiceRegistry::fallback_only();
        assert_eq!(registry.lookup(12345), None);
        assert_eq!(registry.describe(12345), UNKNOWN_SERVICE);
    }

    #[test]
    fn test_parse_services_file() {
        let registry = ServiceRegistry::parse(SAMPLE);
        assert_eq!(registry.lookup(1), Some("tcpmux"));
        assert_eq!(registry.lookup(53), Some("domain"));
        assert_eq!(registry.lookup(80), Some("http"));
        // udp-only entries are ignored, fallback has no 161 either
        assert_eq!(registry.lookup(161), None);
    }

    #[test]
    fn test_system_entries_take_precedence() {
        let registry = ServiceRegistry::parse(SAMPLE);
        assert_eq!(registry.describe(53), "domain");
        // not in the sample, falls back to the static table
        assert_eq!(registry.describe(443), "https");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let registry = ServiceRegistry::from_file(file.path());
        assert_eq!(registry.describe(22), "ssh");
    }

    #[test]
    fn test_missing_file_degrades() {
        let registry = ServiceRegistry::from_file(Path::new("/nonexistent/services"));
        assert_eq!(registry.describe(21), "ftp");
    }
}
