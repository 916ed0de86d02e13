//! Crawler coordinator - run orchestration
//!
//! The coordinator owns everything one crawl run shares:
//! - the frontier, reloaded from the database so interrupted runs resume
//! - the storage handle the workers write pages and links to
//! - the HTTP client and the run's counters
//!
//! [`Coordinator::run`] seeds the frontier, starts the worker pool, waits for
//! every worker to finish and records the outcome of the run.

use crate::config::{config_fingerprint, Config};
use crate::crawler::build_http_client;
use crate::crawler::frontier::Frontier;
use crate::crawler::worker::{CrawlCounters, Worker, WorkerSettings};
use crate::output::{CrawlSummary, StopReason};
use crate::storage::{self, open_storage, FrontierStore, RunStatus, SharedStorage, Storage};
use crate::url::validate_seed;
use crate::SkeinError;
use reqwest::Client;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Requests a cooperative stop of a running crawl
///
/// Closing the frontier is the only cancellation mechanism: workers finish
/// the fetch they are on and exit at their next `next()` call.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    frontier: Arc<Frontier>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested, waiting for workers to finish");
        }
        self.frontier.close();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: SharedStorage,
    frontier: Arc<Frontier>,
    client: Client,
    run_id: i64,
    counters: Arc<CrawlCounters>,
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Forget the visited set and pending targets of earlier runs
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(SkeinError)` - The database or HTTP client could not be set up
    pub fn new(config: Config, fresh: bool) -> Result<Self, SkeinError> {
        let db_path = Path::new(&config.output.database_path);

        // Pages and links go through one connection, admission through
        // another, so workers writing pages never wait on the frontier lock
        let mut page_store = open_storage(db_path)?;
        let mut frontier_store = open_storage(db_path)?;

        if fresh {
            tracing::info!("Starting fresh: clearing visited URLs and pending targets");
            frontier_store.clear()?;
        }

        let frontier = Frontier::open(Box::new(frontier_store))?;

        let fingerprint = config_fingerprint(&config)?;
        let run_id = page_store.create_run(&fingerprint)?;
        tracing::info!("Created run {} (config {})", run_id, &fingerprint[..12]);

        let client = build_http_client(&config.crawler, &config.user_agent)?;

        Ok(Self {
            config: Arc::new(config),
            storage: storage::shared(page_store),
            frontier: Arc::new(frontier),
            client,
            run_id,
            counters: Arc::new(CrawlCounters::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Handle that stops this crawl from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            frontier: Arc::clone(&self.frontier),
            requested: Arc::clone(&self.shutdown),
        }
    }

    /// Runs the crawl to completion
    ///
    /// 1. Admits every seed at depth 0 (invalid or already visited seeds are
    ///    logged and skipped)
    /// 2. Starts `crawler.workers` workers on the shared frontier
    /// 3. Waits until the frontier drains, the page budget closes it, or a
    ///    shutdown is requested
    /// 4. Records the run outcome and returns the summary
    pub async fn run(self, seeds: &[String]) -> Result<CrawlSummary, SkeinError> {
        let start = Instant::now();
        tracing::info!("Starting crawl run {}", self.run_id);

        let (seeds_admitted, seeds_skipped) = self.admit_seeds(seeds);
        tracing::info!(
            "Seeded frontier: {} admitted, {} skipped, {} queued in total",
            seeds_admitted,
            seeds_skipped,
            self.frontier.len()
        );

        let settings = Arc::new(WorkerSettings::from_config(&self.config.crawler));
        let mut workers = JoinSet::new();
        for id in 0..self.config.crawler.workers {
            let worker = Worker::new(
                id,
                Arc::clone(&self.frontier),
                Arc::clone(&self.storage),
                self.client.clone(),
                Arc::clone(&settings),
                Arc::clone(&self.counters),
            );
            workers.spawn(worker.run());
        }

        let mut worker_failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(processed) => {
                    tracing::debug!("Worker exited after {} targets", processed);
                }
                Err(e) => {
                    // A worker that died mid-target never completes it, so
                    // the others would wait forever on a frontier that
                    // cannot drain
                    tracing::error!("Worker terminated abnormally: {}", e);
                    self.frontier.close();
                    worker_failure.get_or_insert(e.to_string());
                }
            }
        }

        let pages_saved = self.counters.pages_saved();
        let stop_reason = if self.shutdown.load(Ordering::SeqCst) {
            StopReason::Shutdown
        } else if pages_saved >= self.config.crawler.max_pages {
            StopReason::BudgetReached
        } else {
            StopReason::Drained
        };

        let summary = CrawlSummary {
            run_id: self.run_id,
            pages_saved,
            fetch_errors: self.counters.fetch_errors(),
            save_errors: self.counters.save_errors(),
            storage_errors: self.counters.storage_errors(),
            targets_admitted: self.counters.targets_admitted(),
            links_recorded: self.counters.links_recorded(),
            seeds_admitted,
            seeds_skipped,
            pending_targets: self.frontier.len() as u64,
            stop_reason,
            elapsed: start.elapsed(),
        };

        let status = match (&worker_failure, stop_reason) {
            (Some(_), _) => RunStatus::Failed,
            (None, StopReason::Shutdown) => RunStatus::Interrupted,
            (None, _) => RunStatus::Completed,
        };
        storage::lock(&self.storage).finish_run(
            self.run_id,
            status,
            summary.pages_saved,
            summary.targets_discarded(),
        )?;

        if let Some(message) = worker_failure {
            return Err(SkeinError::Worker(message));
        }

        tracing::info!(
            "Crawl run {} finished ({}): {} pages saved, {} targets discarded in {:.1?}",
            self.run_id,
            stop_reason,
            summary.pages_saved,
            summary.targets_discarded(),
            summary.elapsed
        );

        Ok(summary)
    }

    /// Admits seeds at depth 0, returning (admitted, skipped)
    fn admit_seeds(&self, seeds: &[String]) -> (u64, u64) {
        let mut admitted = 0;
        let mut skipped = 0;

        for seed in seeds {
            let url = match validate_seed(seed) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping seed {}: {}", seed, e);
                    skipped += 1;
                    continue;
                }
            };

            match self.frontier.admit(url, 0, None) {
                Ok(true) => {
                    admitted += 1;
                    self.counters.record_admitted();
                }
                Ok(false) => {
                    tracing::info!("Skipping seed {}: already visited", seed);
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping seed {}: {}", seed, e);
                    skipped += 1;
                }
            }
        }

        (admitted, skipped)
    }
}

/// Runs a complete crawl of `seeds` with a new coordinator
///
/// # Example
///
/// ```no_run
/// use skein::config::load_config;
/// use skein::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("skein.toml"))?;
/// let seeds = config.seeds.clone();
/// let summary = run_crawl(config, &seeds, false).await?;
/// println!("saved {} pages", summary.pages_saved);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    seeds: &[String],
    fresh: bool,
) -> Result<CrawlSummary, SkeinError> {
    Coordinator::new(config, fresh)?.run(seeds).await
}
