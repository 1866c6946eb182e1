//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use super::{tls_detail, RenderOptions};
use crate::analysis::{AnalysisReport, RiskLevel};
use crate::scanner::traits::{PortState, ScanReport};
use console::{style, Style};
use std::io::{self, Write};

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// Write a report in human-readable plain text format.
pub fn write_plain<W: Write>(
    out: &mut W,
    report: &ScanReport,
    options: RenderOptions<'_>,
) -> io::Result<()> {
    // Header
    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(
        out,
        "                    {} Scan Report",
        style("portsight").cyan().bold()
    )?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    // Scan info
    writeln!(out, "  {} {}", style("Target:").bold(), report.target)?;
    if let Some(ip) = &report.ip_address {
        writeln!(out, "  {} {}", style("IP Address:").bold(), ip)?;
    }
    writeln!(out, "  {} {}", style("Ports:").bold(), report.port_range)?;
    writeln!(
        out,
        "  {} {}",
        style("Started:").bold(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "  {} {}{}",
        style("Scan ID:").bold(),
        style(report.id.short()).dim(),
        if options.cached {
            style(" (cached)").yellow().to_string()
        } else {
            String::new()
        }
    )?;
    writeln!(out)?;

    // Statistics
    writeln!(
        out,
        "  {} {} ports scanned in {:.2}s",
        style("Statistics:").bold(),
        report.results.len(),
        report.duration_ms as f64 / 1000.0
    )?;
    writeln!(
        out,
        "               {} open, {} closed, {} error",
        style(report.open_ports()).green().bold(),
        style(report.closed_ports()).red(),
        style(report.error_ports()).yellow()
    )?;
    writeln!(out)?;

    let shown: Vec<_> = report
        .results
        .iter()
        .filter(|r| options.show_closed || r.is_open())
        .collect();

    if shown.is_empty() {
        writeln!(out, "  {}", style("No open ports found.").dim())?;
    } else {
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        writeln!(
            out,
            "  {:>6}  {:^8}  {:<30}  {}",
            style("PORT").bold(),
            style("STATE").bold(),
            style("SERVICE").bold(),
            style("TLS").bold()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;

        for result in shown {
            let state_style = match result.state {
                PortState::Open => Style::new().green().bold(),
                PortState::Closed => Style::new().red(),
                PortState::Error => Style::new().yellow(),
            };

            let tls_display = match &result.tls_info {
                Some(info) if info.is_valid() => style(tls_detail(info)).green(),
                Some(info) => style(tls_detail(info)).red(),
                None => style(String::new()),
            };

            writeln!(
                out,
                "  {:>6}  {:^8}  {:<30}  {}",
                result.port,
                state_style.apply_to(result.state.to_string()),
                truncate_string(&result.service, 30),
                tls_display
            )?;
        }

        writeln!(out, "  {}", style(THIN_RULE).dim())?;
    }

    if let Some(analysis) = options.analysis {
        write_analysis(out, analysis)?;
    }

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    Ok(())
}

fn write_analysis<W: Write>(out: &mut W, analysis: &AnalysisReport) -> io::Result<()> {
    let risk_style = match analysis.risk_level {
        RiskLevel::High => Style::new().red().bold(),
        RiskLevel::Medium => Style::new().yellow().bold(),
        RiskLevel::Low => Style::new().green().bold(),
        RiskLevel::Unknown => Style::new().dim(),
    };

    writeln!(out)?;
    writeln!(out, "  {}", style("Security Analysis").bold().underlined())?;
    writeln!(
        out,
        "  {} {}",
        style("Risk Level:").bold(),
        risk_style.apply_to(analysis.risk_level)
    )?;
    writeln!(out)?;
    for line in analysis.summary.lines() {
        writeln!(out, "  {}", line)?;
    }

    if !analysis.vulnerabilities.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {}", style("Vulnerabilities:").bold())?;
        for vuln in &analysis.vulnerabilities {
            writeln!(
                out,
                "  {} [{}] {}",
                style("•").dim(),
                style(&vuln.severity).yellow(),
                vuln.description
            )?;
        }
    }

    Ok(())
}

/// Print a report in plain text format.
pub fn print_plain(report: &ScanReport, options: RenderOptions<'_>) -> io::Result<()> {
    let stdout = io::stdout();
    write_plain(&mut stdout.lock(), report, options)
}

/// Print a scan header before scanning begins.
pub fn print_scan_header(target: &str, ports: &str, port_count: usize) {
    println!();
    println!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("portsight").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{} Target: {}", style("•").dim(), style(target).white().bold());
    println!(
        "{} Scanning {} ports ({})...",
        style("•").dim(),
        style(port_count).white().bold(),
        ports
    );
    println!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Vulnerability;
    use crate::output::fixtures;

    fn render(options: RenderOptions<'_>) -> String {
        console::set_colors_enabled(false);
        let mut buf = Vec::new();
        write_plain(&mut buf, &fixtures::report(), options).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn has_port_row(text: &str, port: u16) -> bool {
        text.lines()
            .any(|l| l.trim_start().starts_with(&format!("{}  ", port)))
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("ééééé", 5), "ééééé");
    }

    #[test]
    fn test_closed_ports_hidden_by_default() {
        let text = render(RenderOptions::default());
        assert!(text.contains("Target: example.com"));
        assert!(text.contains("2 open, 1 closed, 1 error"));
        assert!(has_port_row(&text, 443));
        assert!(has_port_row(&text, 445));
        assert!(!has_port_row(&text, 442));
        assert!(!has_port_row(&text, 444));
        assert!(text.contains("TLS error: received corrupt message"));
    }

    #[test]
    fn test_show_closed() {
        let text = render(RenderOptions {
            show_closed: true,
            ..RenderOptions::default()
        });
        assert!(has_port_row(&text, 442));
        assert!(has_port_row(&text, 444));
    }

    #[test]
    fn test_analysis_section() {
        let analysis = AnalysisReport {
            summary: "Two web services exposed.".to_string(),
            vulnerabilities: vec![Vulnerability {
                description: "Weak cipher".to_string(),
                severity: "low".to_string(),
            }],
            risk_level: RiskLevel::Low,
        };
        let text = render(RenderOptions {
            cached: true,
            analysis: Some(&analysis),
            ..RenderOptions::default()
        });
        assert!(text.contains("(cached)"));
        assert!(text.contains("Risk Level: Low"));
        assert!(text.contains("Two web services exposed."));
        assert!(text.contains("[low] Weak cipher"));
    }
}
