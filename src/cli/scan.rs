//! Scan subcommand implementation.
//!
//! Handles the `portsight scan <target>` command: consults the cache,
//! runs the engine, stores the report and optionally analyzes it.

use super::{Context, OutputFormat};
use crate::analysis::{AnalysisReport, AnalyzerConfig, SecurityAnalyzer};
use crate::error::{CliError, CliResult, ValidationError};
use crate::output::{self, RenderOptions};
use crate::scanner::traits::ScanReport;
use crate::scanner::{ReconEngine, ScanOptions};
use crate::types::{PortRange, Target};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, warn};

/// Scan a target for open ports.
#[derive(Parser, Debug)]
pub struct ScanCommand {
    /// Target to scan (IP address or hostname)
    ///
    /// Examples:
    ///   192.168.1.1              IPv4 address
    ///   example.com              Hostname
    ///   https://example.com/x    URL, scheme and path are stripped
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Port range to scan, "<start>-<end>" [default: from settings, 1-1024]
    #[arg(short, long)]
    pub ports: Option<String>,

    /// Maximum number of probes in flight
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Connection timeout in milliseconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    /// Ignore cached reports and do not store the new one
    #[arg(long)]
    pub no_cache: bool,

    /// Run the security analysis on the results
    #[arg(long)]
    pub analyze: bool,

    /// Show closed and errored ports in plain output
    #[arg(long)]
    pub show_closed: bool,
}

impl ScanCommand {
    /// Execute the scan command.
    pub async fn execute(&self, ctx: &Context) -> CliResult<()> {
        let target = Target::validate(&self.target).map_err(ValidationError::from)?;
        let raw_range = self
            .ports
            .as_deref()
            .unwrap_or(ctx.settings.default_ports.as_str());
        let range: PortRange = raw_range.parse().map_err(ValidationError::from)?;
        let key = target.to_string();
        let plain = self.output == OutputFormat::Plain;

        let cache = ctx.cache();
        if !self.no_cache {
            if let Some(report) = cache.get_for_range(&key, range) {
                debug!(key = %key, "serving cached report");
                return self.finish(&report, true).await;
            }
        }

        if !ctx.quiet && plain {
            output::print_scan_header(&key, &range.to_string(), range.len());
        }

        let mut engine = ReconEngine::new(self.scan_options(ctx))
            .map_err(|e| CliError::Other(format!("failed to initialize TLS: {}", e)))?;
        if ctx.verbose && plain {
            engine = engine.with_progress(progress_bar(range.len() as u64)?);
        }

        let report = engine.scan_validated(target, range).await;

        if !self.no_cache {
            if let Err(e) = cache.store(&key, &report) {
                warn!(error = %e, "failed to cache report");
                if !ctx.quiet {
                    output::print_warning(&format!("Report not cached: {}", e));
                }
            }
        }

        self.finish(&report, false).await
    }

    /// Settings with command-line overrides applied.
    fn scan_options(&self, ctx: &Context) -> ScanOptions {
        let mut options = ctx.settings.scan_options();
        if let Some(concurrency) = self.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if let Some(ms) = self.timeout {
            options = options.with_connect_timeout(Duration::from_millis(ms));
        }
        options
    }

    async fn finish(&self, report: &ScanReport, cached: bool) -> CliResult<()> {
        let analysis = if self.analyze {
            Some(analyze(report).await)
        } else {
            None
        };

        let options = RenderOptions {
            show_closed: self.show_closed,
            cached,
            analysis: analysis.as_ref(),
        };
        output::format_report(report, self.output, options)?;
        Ok(())
    }
}

/// Analyzer configuration from `MISTRAL_API_KEY`, `CODEPAL_API_KEY` and
/// `HUGGINGFACE_API_KEY`. Empty values count as missing.
fn analyzer_config_from_env() -> AnalyzerConfig {
    let key = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    AnalyzerConfig {
        mistral_api_key: key("MISTRAL_API_KEY"),
        codepal_api_key: key("CODEPAL_API_KEY"),
        huggingface_api_key: key("HUGGINGFACE_API_KEY"),
        ..AnalyzerConfig::default()
    }
}

async fn analyze(report: &ScanReport) -> AnalysisReport {
    let config = analyzer_config_from_env();
    if !config.has_any_key() {
        debug!("no analysis API keys configured");
    }

    match SecurityAnalyzer::new(config) {
        Ok(analyzer) => analyzer.analyze(&report.results).await,
        Err(e) => {
            warn!(error = %e, "could not build analysis client");
            AnalysisReport::default()
        }
    }
}

fn progress_bar(len: u64) -> CliResult<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map_err(|e| CliError::Other(e.to_string()))?
            .progress_chars("=>-"),
    );
    Ok(pb)
}
