//! JSON output formatting.

use super::RenderOptions;
use crate::analysis::AnalysisReport;
use crate::scanner::traits::ScanReport;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    report: &'a ScanReport,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a AnalysisReport>,
}

/// Write a report as pretty-printed JSON.
pub fn write_json<W: Write>(
    out: &mut W,
    report: &ScanReport,
    options: RenderOptions<'_>,
) -> io::Result<()> {
    let document = JsonOutput {
        report,
        cached: options.cached,
        analysis: options.analysis,
    };
    serde_json::to_writer_pretty(&mut *out, &document)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writeln!(out)
}

/// Print a report in JSON format.
pub fn print_json(report: &ScanReport, options: RenderOptions<'_>) -> io::Result<()> {
    let stdout = io::stdout();
    write_json(&mut stdout.lock(), report, options)
}
