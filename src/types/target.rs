//! Target validation and normalization.
//!
//! A target is either an IP literal (IPv4 or IPv6) or a syntactically
//! valid hostname. Input such as `https://host/path?q=1` is normalized
//! by stripping the scheme and everything from the first `/`, `?` or `#`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum total hostname length.
pub const MAX_HOSTNAME_LEN: usize = 255;

/// Maximum length of a single hostname label.
pub const MAX_LABEL_LEN: usize = 63;

/// A validated scan target. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    /// An IPv4 or IPv6 literal.
    Ip(IpAddr),
    /// A hostname that passed the label rules.
    Hostname(String),
}

/// Reason a target string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,
    #[error("hostname is {0} characters long (max 255)")]
    TooLong(usize),
    #[error("hostname contains an empty label")]
    EmptyLabel,
    #[error("label '{0}' exceeds 63 characters")]
    LabelTooLong(String),
    #[error("label '{label}' contains invalid character '{ch}'")]
    InvalidCharacter { label: String, ch: char },
    #[error("label '{0}' must not start or end with a hyphen")]
    HyphenBoundary(String),
}

impl Target {
    /// Normalize and validate a user-supplied target string.
    pub fn validate(raw: &str) -> Result<Self, TargetError> {
        let host = normalize(raw);
        if host.is_empty() {
            return Err(TargetError::Empty);
        }

        // IP literals are accepted outright
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            if let Ok(ip) = inner.parse::<IpAddr>() {
                return Ok(Self::Ip(ip));
            }
        }

        validate_hostname(host)?;
        Ok(Self::Hostname(host.to_ascii_lowercase()))
    }

    /// Host string used for connections, SNI and the HTTP `Host` header.
    pub fn host(&self) -> String {
        match self {
            Self::Ip(ip) => ip.to_string(),
            Self::Hostname(name) => name.clone(),
        }
    }

    /// The IP address if this target is a literal.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ip(ip) => Some(*ip),
            Self::Hostname(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Hostname(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

/// Strip an `http://`/`https://` scheme and any path, query or fragment.
fn normalize(raw: &str) -> &str {
    let s = raw.trim();
    let s = strip_prefix_ignore_case(s, "http://")
        .or_else(|| strip_prefix_ignore_case(s, "https://"))
        .unwrap_or(s);
    let end = s.find(['/', '?', '#']).unwrap_or(s.len());
    &s[..end]
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn validate_hostname(host: &str) -> Result<(), TargetError> {
    if host.len() > MAX_HOSTNAME_LEN {
        return Err(TargetError::TooLong(host.len()));
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err(TargetError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(TargetError::LabelTooLong(label.to_string()));
        }
        if let Some(ch) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(TargetError::InvalidCharacter {
                label: label.to_string(),
                ch,
            });
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(TargetError::HyphenBoundary(label.to_string()));
        }
    }

    Ok(())
}
