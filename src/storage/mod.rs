//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Page persistence keyed by URL
//! - Link graph recording with lazy id resolution
//! - The persisted visited set and pending frontier queue
//! - Run tracking

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryFrontierStore;
pub use sqlite::SqliteStorage;
pub use traits::{FrontierStore, Storage, StorageError, StorageResult};

use crate::SkeinError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage handle shared by all workers of a crawl
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a storage backend for sharing across workers
pub fn shared<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, recovering the guard if another worker panicked
/// while holding it
pub fn lock(storage: &SharedStorage) -> MutexGuard<'_, dyn Storage + Send + 'static> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens (or creates) the SQLite database at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SkeinError> {
    SqliteStorage::new(path)
}

/// A page ready to be persisted
#[derive(Debug, Clone)]
pub struct NewPage {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub description: String,
    pub content: String,
    /// Hex SHA-256 of `content`
    pub content_hash: String,
    pub outbound_links: Vec<String>,
    pub depth: u32,
    pub referrer: Option<String>,
    pub status_code: u16,
    /// Last-Modified header as the server sent it
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Represents a page in the database
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub content_hash: String,
    pub outbound_links: Vec<String>,
    pub depth: u32,
    pub referrer: Option<String>,
    pub status_code: u16,
    pub last_modified: Option<String>,
    pub fetched_at: String,
}

/// Represents a directed edge between two URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub from_url: String,
    pub to_url: String,
    pub from_page_id: Option<i64>,
    pub to_page_id: Option<i64>,
    /// Text of the first `<a>` seen for this edge
    pub anchor_text: String,
}

impl LinkRecord {
    /// True once both endpoints have been saved as pages
    pub fn is_resolved(&self) -> bool {
        self.from_page_id.is_some() && self.to_page_id.is_some()
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub pages_saved: u64,
    pub targets_discarded: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
