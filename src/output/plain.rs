//! Styled console messages.

use crate::engine::ScanReport;
use crate::scanner::{ProbeOutcome, ScanType};
use console::{style, Style};
use std::path::Path;

/// Print the run banner before probing begins.
pub fn print_run_header(targets: usize, workers: usize, scan_type: ScanType, dry_run: bool) {
    println!();
    println!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("portrunner").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    let mode = if dry_run {
        style("dry-run".to_string()).magenta()
    } else {
        style(scan_type.to_string()).yellow()
    };
    println!("{} Scan type: {}", style("•").dim(), mode);
    println!(
        "{} Probing {} targets with {} workers...",
        style("•").dim(),
        style(targets).white().bold(),
        style(workers).white().bold()
    );
    println!();
}

/// Print what a finished (or interrupted) run did.
pub fn print_summary(report: &ScanReport, output: &Path) {
    let summary = &report.summary;
    println!();
    println!(
        "  {} {} records written to {} in {:.2}s",
        style("Statistics:").bold(),
        summary.total(),
        style(output.display()).white().bold(),
        report.elapsed.as_secs_f64()
    );

    let counts: Vec<String> = ProbeOutcome::ALL
        .iter()
        .filter(|o| summary.count(**o) > 0)
        .map(|o| {
            format!(
                "{} {}",
                outcome_style(*o).apply_to(summary.count(*o)),
                o.as_str().to_lowercase()
            )
        })
        .collect();
    if !counts.is_empty() {
        println!("               {}", counts.join(", "));
    }

    if report.interrupted {
        match &report.checkpoint {
            Some((path, remaining)) => print_warning(&format!(
                "Interrupted; {} targets saved to {}. Resume with: portrunner resume {}",
                remaining,
                path.display(),
                path.display()
            )),
            None => print_warning("Interrupted; every target had already been dispatched."),
        }
    } else {
        print_success("Scan complete");
    }
    println!();
}

fn outcome_style(outcome: ProbeOutcome) -> Style {
    match outcome {
        ProbeOutcome::Open => Style::new().green().bold(),
        ProbeOutcome::Closed => Style::new().red(),
        ProbeOutcome::Filtered => Style::new().yellow(),
        ProbeOutcome::Error => Style::new().red().bold(),
        ProbeOutcome::DryRun => Style::new().magenta(),
    }
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

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}
