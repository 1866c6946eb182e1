//! Cache subcommand implementation.
//!
//! Handles `portsight cache show|clear|purge`.

use super::{Context, OutputFormat};
use crate::error::{CliResult, ValidationError};
use crate::output::{self, RenderOptions};
use crate::types::Target;
use clap::{Parser, Subcommand};

/// Inspect or maintain the report cache.
#[derive(Parser, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cached report for a target, if still fresh
    Show {
        /// Target the report was cached under
        #[arg(value_name = "TARGET")]
        target: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "plain")]
        output: OutputFormat,
    },

    /// Remove every cached report
    Clear,

    /// Remove expired reports
    Purge,
}

impl CacheCommand {
    /// Execute the cache command.
    pub fn execute(&self, ctx: &Context) -> CliResult<()> {
        let cache = ctx.cache();

        match &self.action {
            CacheAction::Show { target, output } => {
                let key = Target::validate(target)
                    .map_err(ValidationError::from)?
                    .to_string();
                match cache.get(&key) {
                    Some(report) => {
                        let options = RenderOptions {
                            cached: true,
                            show_closed: true,
                            ..RenderOptions::default()
                        };
                        output::format_report(&report, *output, options)?;
                    }
                    None if !ctx.quiet => {
                        output::print_warning(&format!("No cached report for {}", key));
                    }
                    None => {}
                }
            }
            CacheAction::Clear => {
                let removed = cache.clear()?;
                if !ctx.quiet {
                    output::print_success(&format!("Removed {} cached report(s)", removed));
                }
            }
            CacheAction::Purge => {
                let removed = cache.purge_expired()?;
                if !ctx.quiet {
                    output::print_success(&format!("Purged {} expired report(s)", removed));
                }
            }
        }

        Ok(())
    }
}
