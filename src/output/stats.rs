//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::SkeinError;
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored pages
    pub total_pages: u64,

    /// Stored pages whose content another stored page repeats
    pub duplicate_pages: u64,

    /// Total number of recorded edges
    pub total_links: u64,

    /// Edges whose endpoints are both stored pages
    pub resolved_links: u64,

    /// URLs ever admitted to the frontier
    pub visited_urls: u64,

    /// Targets admitted but not yet finished
    pub pending_targets: u64,

    /// Stored pages per crawl depth
    pub pages_by_depth: BTreeMap<u32, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(SkeinError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, SkeinError> {
    Ok(CrawlStatistics {
        total_pages: storage.count_pages()?,
        duplicate_pages: storage.count_duplicate_content()?,
        total_links: storage.count_links()?,
        resolved_links: storage.count_resolved_links()?,
        visited_urls: storage.count_visited_urls()?,
        pending_targets: storage.count_pending_targets()?,
        pages_by_depth: storage.depth_breakdown()?,
        latest_run: storage.latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages stored: {}", stats.total_pages);
    println!("  Duplicate content: {}", stats.duplicate_pages);
    println!("  URLs visited: {}", stats.visited_urls);
    println!("  Targets pending: {}", stats.pending_targets);
    println!();

    let resolved_pct = if stats.total_links > 0 {
        (stats.resolved_links as f64 / stats.total_links as f64) * 100.0
    } else {
        0.0
    };
    println!("Link Graph:");
    println!("  Edges: {}", stats.total_links);
    println!(
        "  Resolved: {} ({:.1}%)",
        stats.resolved_links, resolved_pct
    );
    println!();

    if !stats.pages_by_depth.is_empty() {
        println!("Pages by Depth:");
        for (depth, count) in &stats.pages_by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Pages saved: {}", run.pages_saved);
            println!("  Targets discarded: {}", run.targets_discarded);
        }
        None => println!("No crawl runs recorded"),
    }
}
