//! Application settings and paths.
//!
//! Manages XDG-compliant paths for configuration and cache, and the
//! JSON settings file that seeds engine and cache defaults.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::{ScanOptions, TlsTrigger};
use crate::types::{PortRange, DEFAULT_PORT_RANGE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/portsight)
    pub config_dir: PathBuf,
    /// Cache directory (~/.cache/portsight)
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Resolve the XDG directories, creating them if needed.
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "portsight", "portsight")
            .ok_or(ConfigError::DirectoryNotFound)?;

        let paths = Self {
            config_dir: project.config_dir().to_path_buf(),
            cache_dir: project.cache_dir().to_path_buf(),
        };

        fs::create_dir_all(&paths.config_dir)?;
        fs::create_dir_all(&paths.cache_dir)?;

        Ok(paths)
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Get the path to the scan cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("scan_cache.json")
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Maximum probes in flight.
    pub concurrency: usize,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Banner read/write timeout in milliseconds.
    pub banner_timeout_ms: u64,
    /// TLS connect plus handshake timeout in milliseconds.
    pub tls_timeout_ms: u64,
    /// How long a cached report stays fresh, in seconds.
    pub cache_ttl_secs: u64,
    /// Port range used when none is given.
    pub default_ports: String,
    /// Services whose open ports get certificate inspection.
    pub tls_services: Vec<String>,
    /// Inspect every open port regardless of service.
    pub tls_on_all_open: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            concurrency: 256,
            connect_timeout_ms: 1000,
            banner_timeout_ms: 1000,
            tls_timeout_ms: 3000,
            cache_ttl_secs: 3600,
            default_ports: DEFAULT_PORT_RANGE.to_string(),
            tls_services: vec!["https".to_string(), "https-alt".to_string()],
            tls_on_all_open: false,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, or defaults if absent.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let file = paths.settings_file();
        if !file.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a specific file.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue("concurrency must be > 0".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.banner_timeout_ms == 0 || self.tls_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("timeouts must be > 0".to_string()));
        }
        self.default_ports
            .parse::<PortRange>()
            .map_err(|e| ConfigError::InvalidValue(format!("default_ports: {}", e)))?;
        Ok(())
    }

    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Engine options derived from these settings.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
            .with_concurrency(self.concurrency)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_banner_timeout(Duration::from_millis(self.banner_timeout_ms))
            .with_tls_timeout(Duration::from_millis(self.tls_timeout_ms))
            .with_tls_trigger(TlsTrigger::new(self.tls_services.clone(), self.tls_on_all_open))
    }
}
