//! In-memory frontier store
//!
//! Used when a frontier does not need to survive the process.

use crate::crawler::CrawlTarget;
use crate::storage::traits::{FrontierStore, StorageResult};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Visited set and pending targets held in memory
///
/// Pending targets are keyed by an admission sequence number, like the
/// `frontier` table's `seq` column, so completing one is a keyed removal.
#[derive(Debug, Default)]
pub struct MemoryFrontierStore {
    visited: HashSet<String>,
    pending: BTreeMap<u64, CrawlTarget>,
    pending_seq: HashMap<String, u64>,
    next_seq: u64,
}

impl MemoryFrontierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrontierStore for MemoryFrontierStore {
    fn admit(&mut self, target: &CrawlTarget) -> StorageResult<bool> {
        let url = target.url.as_str();
        if !self.visited.insert(url.to_string()) {
            return Ok(false);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, target.clone());
        self.pending_seq.insert(url.to_string(), seq);
        Ok(true)
    }

    fn complete(&mut self, url: &str) -> StorageResult<()> {
        if let Some(seq) = self.pending_seq.remove(url) {
            self.pending.remove(&seq);
        }
        Ok(())
    }

    fn pending(&self) -> StorageResult<Vec<CrawlTarget>> {
        Ok(self.pending.values().cloned().collect())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.visited.clear();
        self.pending.clear();
        self.pending_seq.clear();
        Ok(())
    }
}
