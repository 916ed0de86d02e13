//! Run summary returned by a crawl

use std::fmt;
use std::time::Duration;

/// Why a crawl run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frontier ran out of work
    Drained,

    /// The page budget was reached and the frontier closed
    BudgetReached,

    /// A shutdown was requested
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Drained => "frontier drained",
            Self::BudgetReached => "page budget reached",
            Self::Shutdown => "shutdown requested",
        };
        f.write_str(s)
    }
}

/// Aggregate outcome of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: i64,

    /// Pages fetched, parsed and stored
    pub pages_saved: u64,

    /// Targets discarded because the fetch failed
    pub fetch_errors: u64,

    /// Targets discarded because the page could not be stored
    pub save_errors: u64,

    /// Failed admissions, link writes and frontier completions
    pub storage_errors: u64,

    /// Targets admitted to the frontier during the run, seeds included
    pub targets_admitted: u64,

    /// New edges written to the link graph
    pub links_recorded: u64,

    pub seeds_admitted: u64,
    pub seeds_skipped: u64,

    /// Targets left queued when the run stopped; a later run resumes them
    pub pending_targets: u64,

    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl CrawlSummary {
    /// Targets dropped because of an error
    pub fn targets_discarded(&self) -> u64 {
        self.fetch_errors + self.save_errors
    }

    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.pages_saved as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Run {} ===\n", summary.run_id);

    println!("Stopped: {}", summary.stop_reason);
    println!(
        "Elapsed: {:.1?} ({:.2} pages/sec)",
        summary.elapsed,
        summary.pages_per_second()
    );
    println!();

    println!("Pages:");
    println!("  Saved: {}", summary.pages_saved);
    println!("  Discarded: {}", summary.targets_discarded());
    println!("    Fetch errors: {}", summary.fetch_errors);
    println!("    Save errors: {}", summary.save_errors);
    println!();

    println!("Frontier:");
    println!(
        "  Seeds: {} admitted, {} skipped",
        summary.seeds_admitted, summary.seeds_skipped
    );
    println!("  Targets admitted: {}", summary.targets_admitted);
    println!("  Left pending: {}", summary.pending_targets);
    println!();

    println!("Links recorded: {}", summary.links_recorded);
    if summary.storage_errors > 0 {
        println!("Storage errors: {}", summary.storage_errors);
    }
}
