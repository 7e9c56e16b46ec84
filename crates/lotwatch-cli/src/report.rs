use lotwatch_core::diff::{ChangeStatus, ChangeSummary};
use lotwatch_core::error::AppError;
use lotwatch_core::harvest::RunReport;
use lotwatch_core::traits::ReportEmitter;

/// Prints the run summary to stdout, as a table or as JSON.
pub struct ConsoleReport {
    json: bool,
}

impl ConsoleReport {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl ReportEmitter for ConsoleReport {
    async fn emit(&self, report: &RunReport) -> Result<(), AppError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        println!();
        println!("Run {}", report.run_date);
        match report.prior_date {
            Some(prior) => println!("Compared against {prior}"),
            None => println!("No prior snapshot (first run)"),
        }
        println!(
            "Pages fetched: {}, listings discovered: {}",
            report.pages_fetched, report.discovered
        );
        print_summary(&report.summary, report.failures.len(), report.total_rows());

        if !report.failures.is_empty() {
            println!("\nFailed extractions:");
            for failure in &report.failures {
                println!(
                    "  {} ({} attempts): {}",
                    failure.url, failure.attempts, failure.message
                );
            }
        }
        if let Some(path) = &report.artifact {
            println!("\nArtifact: {}", path.display());
        }
        Ok(())
    }
}

/// Per-status count table.
pub fn print_summary(summary: &ChangeSummary, failed: usize, total: usize) {
    println!("┌──────────────┬──────────┐");
    println!("│ Status       │    Count │");
    println!("├──────────────┼──────────┤");
    for status in ChangeStatus::ALL {
        println!("│ {:<12} │ {:>8} │", status.as_str(), summary.count(status));
    }
    println!("├──────────────┼──────────┤");
    println!("│ {:<12} │ {:>8} │", "FAILED", failed);
    println!("│ {:<12} │ {:>8} │", "TOTAL", total);
    println!("└──────────────┴──────────┘");
}
