//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with timeout and outcome classification
//! - HTML extraction of title, description, content and raw links
//! - The shared, deduplicating frontier
//! - The worker loop and overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod worker;

pub use coordinator::{run_crawl, Coordinator, ShutdownHandle};
pub use fetcher::{build_http_client, fetch_url, FetchError, FetchedPage};
pub use frontier::{CrawlTarget, Frontier};
pub use parser::{content_hash, parse_document, ParsedPage, RawLink};
pub use worker::{CrawlCounters, TargetOutcome, Worker, WorkerSettings};
