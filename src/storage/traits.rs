//! Storage traits and error types
//!
//! Two seams live here. [`Storage`] is the page/link collaborator the workers
//! write to. [`FrontierStore`] backs the frontier's visited set and pending
//! queue so admission survives restarts.

use crate::crawler::CrawlTarget;
use crate::storage::{LinkRecord, NewPage, PageRecord, RunRecord, RunStatus};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence collaborator for pages, links, and run bookkeeping
///
/// Writes must be idempotent: saving a URL twice keeps a single page row and
/// inserting an existing edge is a no-op. That is what lets several workers
/// write concurrently without coordinating beyond the frontier.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records the final status and counters of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        pages_saved: u64,
        targets_discarded: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Pages =====

    /// Inserts or updates the page keyed by its URL and returns its id
    ///
    /// Any recorded link naming this URL as an endpoint picks up the id.
    fn upsert_page(&mut self, page: &NewPage) -> StorageResult<i64>;

    /// Looks up a page id by URL
    fn page_id_by_url(&self, url: &str) -> StorageResult<Option<i64>>;

    /// Gets a page by URL
    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    // ===== Links =====

    /// Records the edge `from_url -> to_url` unless it already exists
    ///
    /// Endpoints without a page yet are left unresolved and backfilled by
    /// [`Storage::upsert_page`]. An existing edge keeps its anchor text.
    /// Returns whether a new edge was recorded.
    fn insert_link_if_absent(
        &mut self,
        from_url: &str,
        to_url: &str,
        anchor_text: &str,
    ) -> StorageResult<bool>;

    /// Gets all edges leaving a URL
    fn get_outgoing_links(&self, from_url: &str) -> StorageResult<Vec<LinkRecord>>;

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64>;

    /// Number of saved pages whose content hash another page shares
    fn count_duplicate_content(&self) -> StorageResult<u64>;

    fn count_links(&self) -> StorageResult<u64>;

    /// Counts edges whose endpoints both have a page id
    fn count_resolved_links(&self) -> StorageResult<u64>;

    fn count_visited_urls(&self) -> StorageResult<u64>;

    fn count_pending_targets(&self) -> StorageResult<u64>;

    /// Number of saved pages at each crawl depth
    fn depth_breakdown(&self) -> StorageResult<BTreeMap<u32, u64>>;
}

/// Backing store for the frontier's visited set and pending queue
///
/// The frontier calls these methods while holding its own lock, so an
/// implementation only has to make each call atomic on its own.
pub trait FrontierStore: Send {
    /// Records the URL as visited and the target as pending
    ///
    /// Returns `false` without side effects if the URL was already visited,
    /// including by an earlier run sharing the same store.
    fn admit(&mut self, target: &CrawlTarget) -> StorageResult<bool>;

    /// Drops a finished target from the pending queue
    fn complete(&mut self, url: &str) -> StorageResult<()>;

    /// Pending targets in admission order
    fn pending(&self) -> StorageResult<Vec<CrawlTarget>>;

    /// Forgets all visited URLs and pending targets
    fn clear(&mut self) -> StorageResult<()>;
}
