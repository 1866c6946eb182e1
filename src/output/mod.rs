//! Output formatting module.
//!
//! Provides formatters for plain text, JSON, and CSV output of scan reports.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::{print_csv, write_csv};
pub use json_format::{print_json, write_json};
pub use plain::{
    print_error, print_plain, print_scan_header, print_success, print_warning, write_plain,
};

use crate::analysis::AnalysisReport;
use crate::cli::OutputFormat;
use crate::scanner::traits::ScanReport;
use crate::tls::TlsCertificateInfo;
use std::io;

/// What to render alongside the report itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    /// Include closed and error ports in plain output.
    pub show_closed: bool,
    /// The report came from the cache.
    pub cached: bool,
    /// Optional analysis to append.
    pub analysis: Option<&'a AnalysisReport>,
}

/// Format and print a report according to the specified format.
pub fn format_report(
    report: &ScanReport,
    format: OutputFormat,
    options: RenderOptions<'_>,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => print_plain(report, options),
        OutputFormat::Json => print_json(report, options),
        OutputFormat::Csv => print_csv(report),
    }
}

/// One-line description of a TLS inspection outcome.
pub(crate) fn tls_detail(info: &TlsCertificateInfo) -> String {
    match info {
        TlsCertificateInfo::Valid(cert) => format!(
            "{} issued by {}, {} to {}, {} {}",
            cert.subject_common_name,
            cert.issuer_organization,
            cert.valid_from,
            cert.valid_until,
            cert.protocol_version,
            cert.cipher_suite
        ),
        TlsCertificateInfo::Invalid(failure) => failure.to_string(),
    }
}
