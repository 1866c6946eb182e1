//! CSV output formatting.

use super::tls_detail;
use crate::scanner::traits::ScanReport;
use std::io::{self, Write};

/// Write every result as a CSV row.
pub fn write_csv<W: Write>(out: W, report: &ScanReport) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["port", "state", "service", "tls_valid", "tls_detail"])?;

    for result in &report.results {
        let (valid, detail) = match &result.tls_info {
            Some(info) => (info.is_valid().to_string(), tls_detail(info)),
            None => (String::new(), String::new()),
        };
        wtr.write_record([
            result.port.to_string(),
            result.state.to_string(),
            result.service.clone(),
            valid,
            detail,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Print a report in CSV format.
pub fn print_csv(report: &ScanReport) -> io::Result<()> {
    let stdout = io::stdout();
    write_csv(stdout.lock(), report)
}
