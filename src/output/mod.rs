//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - The summary a crawl run returns
//! - Reading statistics back out of the crawl database

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{print_summary, CrawlSummary, StopReason};
