//! Best-effort security analysis of finished scans.
//!
//! Sends the probe results to three hosted services: a chat-completion
//! summary, a vulnerability assessment and a risk classifier. Each one
//! degrades on its own to a placeholder, so an analysis never fails and
//! never holds back a report. Backends without an API key are skipped
//! without any network I/O.

use crate::error::AnalysisError;
use crate::scanner::traits::PortProbeResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

pub const SUMMARY_UNAVAILABLE: &str = "AI analysis currently unavailable";

pub const MISTRAL_URL: &str = "https://api.mistral.ai/v1/chat/completions";
pub const CODEPAL_URL: &str = "https://api.codepal.ai/v1/security/analyze";
pub const HUGGINGFACE_URL: &str =
    "https://api-inference.huggingface.co/models/microsoft/security-aware-bert";

const MISTRAL_MODEL: &str = "mistral-tiny";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_PROMPT: &str = "You are a cybersecurity expert analyzing port scan results. \
Give a concise assessment of the open ports and their security implications, \
known vulnerable services, and recommended improvements. \
Keep the response brief and actionable.";

/// Overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl RiskLevel {
    /// Map a classifier confidence score onto a level.
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub description: String,
    pub severity: String,
}

/// Combined output of the three sub-analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub vulnerabilities: Vec<Vulnerability>,
    pub risk_level: RiskLevel,
}

impl Default for AnalysisReport {
    fn default() -> Self {
        Self {
            summary: SUMMARY_UNAVAILABLE.to_string(),
            vulnerabilities: Vec::new(),
            risk_level: RiskLevel::Unknown,
        }
    }
}

/// Backend URLs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub mistral: String,
    pub codepal: String,
    pub huggingface: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            mistral: MISTRAL_URL.to_string(),
            codepal: CODEPAL_URL.to_string(),
            huggingface: HUGGINGFACE_URL.to_string(),
        }
    }
}

/// Credentials and limits for the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub mistral_api_key: Option<String>,
    pub codepal_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub timeout: Duration,
    pub endpoints: Endpoints,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mistral_api_key: None,
            codepal_api_key: None,
            huggingface_api_key: None,
            timeout: DEFAULT_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Whether at least one backend can be called.
    pub fn has_any_key(&self) -> bool {
        self.mistral_api_key.is_some()
            || self.codepal_api_key.is_some()
            || self.huggingface_api_key.is_some()
    }
}

pub struct SecurityAnalyzer {
    config: AnalyzerConfig,
    client: reqwest::Client,
}

impl SecurityAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("portsight/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: AnalyzerConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Run all three sub-analyses concurrently.
    pub async fn analyze(&self, results: &[PortProbeResult]) -> AnalysisReport {
        let (summary, vulnerabilities, risk_level) = tokio::join!(
            self.summary(results),
            self.vulnerabilities(results),
            self.risk_level(results)
        );

        AnalysisReport {
            summary: summary.unwrap_or_else(|e| {
                warn!(error = %e, "summary analysis failed");
                SUMMARY_UNAVAILABLE.to_string()
            }),
            vulnerabilities: vulnerabilities.unwrap_or_else(|e| {
                warn!(error = %e, "vulnerability assessment failed");
                Vec::new()
            }),
            risk_level: risk_level.unwrap_or_else(|e| {
                warn!(error = %e, "risk classification failed");
                RiskLevel::Unknown
            }),
        }
    }

    async fn summary(&self, results: &[PortProbeResult]) -> Result<String, AnalysisError> {
        let Some(key) = &self.config.mistral_api_key else {
            debug!("no Mistral key configured, skipping summary");
            return Ok(SUMMARY_UNAVAILABLE.to_string());
        };

        let formatted = serde_json::to_string_pretty(results)
            .map_err(|e| AnalysisError::UnexpectedResponse(e.to_string()))?;
        let payload = json!({
            "model": MISTRAL_MODEL,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": format!(
                        "Analyze these port scan results and provide a security assessment:\n{}",
                        formatted
                    )
                }
            ]
        });

        let body = self.post(&self.config.endpoints.mistral, key, &payload).await?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::UnexpectedResponse("missing completion content".into()))
    }

    async fn vulnerabilities(
        &self,
        results: &[PortProbeResult],
    ) -> Result<Vec<Vulnerability>, AnalysisError> {
        let Some(key) = &self.config.codepal_api_key else {
            debug!("no CodePal key configured, skipping vulnerability assessment");
            return Ok(Vec::new());
        };

        let open: Vec<&PortProbeResult> = results.iter().filter(|r| r.is_open()).collect();
        let services: Vec<Value> = open
            .iter()
            .map(|r| json!({"port": r.port, "service": r.service}))
            .collect();
        let payload = json!({
            "scan_data": {"ports": open, "services": services},
            "analysis_type": "security_assessment",
            "include_cve_data": true
        });

        let body = self.post(&self.config.endpoints.codepal, key, &payload).await?;
        match body.get("vulnerabilities") {
            None => Ok(Vec::new()),
            Some(list) => serde_json::from_value(list.clone())
                .map_err(|e| AnalysisError::UnexpectedResponse(e.to_string())),
        }
    }

    async fn risk_level(&self, results: &[PortProbeResult]) -> Result<RiskLevel, AnalysisError> {
        let Some(key) = &self.config.huggingface_api_key else {
            debug!("no Hugging Face key configured, skipping risk classification");
            return Ok(RiskLevel::Unknown);
        };

        let payload = json!({
            "inputs": classifier_input(results),
            "options": {"wait_for_model": true}
        });

        match self.post(&self.config.endpoints.huggingface, key, &payload).await {
            Ok(body) => Ok(risk_from_classification(&body)),
            // the classifier answered but could not score: medium, like a score-less reply
            Err(AnalysisError::Status(status)) => {
                warn!(status, "risk classifier returned an error status");
                Ok(RiskLevel::Medium)
            }
            Err(e) => Err(e),
        }
    }

    async fn post(&self, url: &str, key: &str, payload: &Value) -> Result<Value, AnalysisError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }
        Ok(response.json::<Value>().await?)
    }
}

/// Describe the open services as one sentence for the classifier.
fn classifier_input(results: &[PortProbeResult]) -> String {
    let open: Vec<String> = results
        .iter()
        .filter(|r| r.is_open())
        .map(|r| format!("{} on port {}", r.service, r.port))
        .collect();
    format!(
        "Security scan detected {} open ports. Services running: {}",
        open.len(),
        open.join(", ")
    )
}

/// Read the top score from a classifier response.
///
/// Accepts both `[{..}]` and the nested `[[{..}]]` shape. A successful
/// response without a usable score is classified as medium.
fn risk_from_classification(body: &Value) -> RiskLevel {
    let first = match body.get(0) {
        Some(Value::Array(inner)) => inner.first(),
        other => other,
    };
    first
        .and_then(|entry| entry.get("score"))
        .and_then(Value::as_f64)
        .map_or(RiskLevel::Medium, RiskLevel::from_score)
}
