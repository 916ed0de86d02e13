//! Crawl worker control loop
//!
//! Each worker repeatedly takes a target from the shared frontier, fetches
//! it, extracts the page, stores it, and admits the links it found. Nothing
//! that goes wrong with a single target leaves that target's iteration: fetch
//! and storage failures are counted, logged and discarded.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{fetch_url, FetchedPage};
use crate::crawler::frontier::{CrawlTarget, Frontier};
use crate::crawler::parser::{content_hash, parse_document, RawLink};
use crate::storage::{self, NewPage, SharedStorage};
use crate::url::{extract_domain, resolve_link};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Counters shared by every worker of a run
#[derive(Debug, Default)]
pub struct CrawlCounters {
    pages_saved: AtomicU64,
    fetch_errors: AtomicU64,
    save_errors: AtomicU64,
    storage_errors: AtomicU64,
    targets_admitted: AtomicU64,
    links_recorded: AtomicU64,
}

impl CrawlCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a saved page and returns the new total
    fn record_page_saved(&self) -> u64 {
        self.pages_saved.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_save_error(&self) {
        self.save_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted(&self) {
        self.targets_admitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_link(&self) {
        self.links_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_saved(&self) -> u64 {
        self.pages_saved.load(Ordering::SeqCst)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }

    /// Pages fetched but discarded because they could not be stored
    pub fn save_errors(&self) -> u64 {
        self.save_errors.load(Ordering::Relaxed)
    }

    /// Failed admissions, link writes and completions
    pub fn storage_errors(&self) -> u64 {
        self.storage_errors.load(Ordering::Relaxed)
    }

    pub fn targets_admitted(&self) -> u64 {
        self.targets_admitted.load(Ordering::Relaxed)
    }

    pub fn links_recorded(&self) -> u64 {
        self.links_recorded.load(Ordering::Relaxed)
    }
}

/// Per-run limits every worker applies
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Page budget; the frontier is closed once this many pages are saved
    pub max_pages: u64,
    pub max_depth: Option<u32>,
    pub politeness_delay: Duration,
    pub fetch_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_depth: config.max_depth,
            politeness_delay: config.politeness_delay(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Whether a link found on a page at `depth` may be followed
    fn allows_child_of(&self, depth: u32) -> bool {
        match self.max_depth {
            Some(max) => depth.saturating_add(1) <= max,
            None => true,
        }
    }
}

/// What happened to a single target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// The page was stored; `admitted` new targets were found on it
    Saved { page_id: i64, admitted: usize },

    /// The fetch failed and the target was discarded
    FetchFailed,

    /// The page could not be stored and the target was discarded
    StorageFailed,
}

/// One crawl worker
pub struct Worker {
    id: usize,
    frontier: Arc<Frontier>,
    storage: SharedStorage,
    client: Client,
    settings: Arc<WorkerSettings>,
    counters: Arc<CrawlCounters>,
}

impl Worker {
    pub fn new(
        id: usize,
        frontier: Arc<Frontier>,
        storage: SharedStorage,
        client: Client,
        settings: Arc<WorkerSettings>,
        counters: Arc<CrawlCounters>,
    ) -> Self {
        Self {
            id,
            frontier,
            storage,
            client,
            settings,
            counters,
        }
    }

    /// Runs until the frontier is closed or drained
    ///
    /// Returns the number of targets this worker took.
    pub async fn run(self) -> u64 {
        tracing::debug!("Worker {} started", self.id);
        let mut processed = 0;

        while let Some(target) = self.frontier.next().await {
            processed += 1;
            self.process(&target).await;

            if let Err(e) = self.frontier.complete(&target) {
                tracing::warn!(
                    "Worker {}: failed to mark {} complete: {}",
                    self.id,
                    target.url,
                    e
                );
                self.counters.record_storage_error();
            }

            if !self.settings.politeness_delay.is_zero() && !self.frontier.is_closed() {
                tokio::time::sleep(self.settings.politeness_delay).await;
            }
        }

        tracing::debug!("Worker {} finished after {} targets", self.id, processed);
        processed
    }

    /// Fetches, extracts, stores and expands one target
    pub async fn process(&self, target: &CrawlTarget) -> TargetOutcome {
        tracing::debug!(
            "Worker {} fetching {} (depth {})",
            self.id,
            target.url,
            target.depth
        );

        let fetched =
            match fetch_url(&self.client, &target.url, self.settings.fetch_timeout).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Discarding {}: {}", target.url, e);
                    self.counters.record_fetch_error();
                    return TargetOutcome::FetchFailed;
                }
            };

        self.record(target, fetched)
    }

    fn record(&self, target: &CrawlTarget, fetched: FetchedPage) -> TargetOutcome {
        let parsed = parse_document(&fetched.text());
        let links = resolve_all(&fetched.final_url, &parsed.links);

        let page = NewPage {
            url: target.url.to_string(),
            domain: extract_domain(&target.url).unwrap_or_default(),
            title: parsed.title,
            description: parsed.description,
            content_hash: content_hash(&parsed.content),
            content: parsed.content,
            outbound_links: links.iter().map(|(url, _)| url.to_string()).collect(),
            depth: target.depth,
            referrer: target.referrer.as_ref().map(Url::to_string),
            status_code: fetched.status,
            last_modified: fetched.last_modified,
            fetched_at: Utc::now(),
        };

        let page_id = match storage::lock(&self.storage).upsert_page(&page) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Discarding {}: failed to save page: {}", target.url, e);
                self.counters.record_save_error();
                return TargetOutcome::StorageFailed;
            }
        };

        let saved = self.counters.record_page_saved();
        tracing::info!(
            "Saved {} (depth {}, {} links) [{}/{}]",
            target.url,
            target.depth,
            links.len(),
            saved,
            self.settings.max_pages
        );

        if saved >= self.settings.max_pages && !self.frontier.is_closed() {
            tracing::info!("Page budget of {} reached", self.settings.max_pages);
            self.frontier.close();
        }

        let admitted = if self.settings.allows_child_of(target.depth) {
            self.expand(target, links)
        } else {
            0
        };

        TargetOutcome::Saved { page_id, admitted }
    }

    /// Admits the links found on `target` and records the edges to them
    fn expand(&self, target: &CrawlTarget, links: Vec<(Url, &str)>) -> usize {
        let child_depth = target.depth + 1;
        let mut admitted = 0;

        for (link, anchor_text) in links {
            if link == target.url {
                continue;
            }

            match self
                .frontier
                .admit(link.clone(), child_depth, Some(target.url.clone()))
            {
                Ok(true) => {
                    admitted += 1;
                    self.counters.record_admitted();
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to admit {}: {}", link, e);
                    self.counters.record_storage_error();
                    continue;
                }
            }

            let recorded = storage::lock(&self.storage)
                .insert_link_if_absent(target.url.as_str(), link.as_str(), anchor_text);
            match recorded {
                Ok(true) => self.counters.record_link(),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to record link {} -> {}: {}",
                        target.url,
                        link,
                        e
                    );
                    self.counters.record_storage_error();
                }
            }
        }

        admitted
    }
}

/// Resolves raw links against `base`, dropping rejects and repeats
///
/// A link found more than once keeps the anchor text of its first
/// occurrence.
fn resolve_all<'a>(base: &Url, raw_links: &'a [RawLink]) -> Vec<(Url, &'a str)> {
    let mut seen = HashSet::new();
    raw_links
        .iter()
        .filter_map(|raw| {
            resolve_link(base, &raw.href).map(|url| (url, raw.anchor_text.as_str()))
        })
        .filter(|(url, _)| seen.insert(url.as_str().to_string()))
        .collect()
}
