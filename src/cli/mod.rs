//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `portsight scan <target>` - Scan a target
//! - `portsight cache show|clear|purge` - Inspect and maintain the report cache

mod cache;
mod scan;

pub use cache::{CacheAction, CacheCommand};
pub use scan::ScanCommand;

use crate::config::{AppSettings, Paths};
use crate::error::CliResult;
use crate::storage::ScanCache;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// portsight - single-host network reconnaissance.
///
/// Probes a range of TCP ports, identifies services from well-known
/// ports and protocol banners, and inspects TLS certificates.
#[derive(Parser, Debug)]
#[command(name = "portsight")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Port, service and TLS reconnaissance for a single host", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to custom settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a target for open ports
    #[command(alias = "s")]
    Scan(ScanCommand),

    /// Inspect or maintain the report cache
    #[command(alias = "c")]
    Cache(CacheCommand),
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Settings and paths shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub verbose: bool,
    pub quiet: bool,
    pub settings: AppSettings,
    pub paths: Paths,
}

impl Context {
    /// Resolve paths and load settings, honoring `--config`.
    pub fn load(cli: &Cli) -> CliResult<Self> {
        let paths = Paths::new()?;
        let settings = match &cli.config {
            Some(path) => AppSettings::load_from(path)?,
            None => AppSettings::load(&paths)?,
        };

        Ok(Self {
            verbose: cli.verbose,
            quiet: cli.quiet,
            settings,
            paths,
        })
    }

    /// The report cache at its default location.
    pub fn cache(&self) -> ScanCache {
        ScanCache::new(self.paths.cache_file(), self.settings.cache_ttl())
    }
}

impl Cli {
    /// Dispatch to the selected subcommand.
    pub async fn run(&self) -> CliResult<()> {
        let ctx = Context::load(self)?;
        match &self.command {
            Commands::Scan(cmd) => cmd.execute(&ctx).await,
            Commands::Cache(cmd) => cmd.execute(&ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_flags() {
        let cli = Cli::try_parse_from([
            "portsight", "-v", "scan", "example.com", "-p", "20-25", "-c", "64", "-t", "500",
            "-o", "json", "--no-cache", "--analyze", "--show-closed",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Commands::Scan(scan) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(scan.target, "example.com");
        assert_eq!(scan.ports.as_deref(), Some("20-25"));
        assert_eq!(scan.concurrency, Some(64));
        assert_eq!(scan.timeout, Some(500));
        assert_eq!(scan.output, OutputFormat::Json);
        assert!(scan.no_cache && scan.analyze && scan.show_closed);
    }

    #[test]
    fn test_parse_scan_defaults() {
        let cli = Cli::try_parse_from(["portsight", "scan", "10.0.0.1"]).unwrap();
        let Commands::Scan(scan) = cli.command else {
            panic!("expected scan command");
        };
        assert!(scan.ports.is_none());
        assert_eq!(scan.output, OutputFormat::Plain);
        assert!(!scan.no_cache);
    }

    #[test]
    fn test_parse_cache_actions() {
        let cli = Cli::try_parse_from(["portsight", "cache", "show", "example.com"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommand {
                action: CacheAction::Show { ref target, output: OutputFormat::Plain }
            }) if target == "example.com"
        ));

        let cli = Cli::try_parse_from(["portsight", "cache", "purge"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommand { action: CacheAction::Purge })
        ));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["portsight", "-v", "-q", "cache", "clear"]).is_err());
    }
}
