//! Shared work queue of URLs awaiting a visit
//!
//! The frontier owns the visited set and the FIFO queue behind one lock, so
//! the membership check and the enqueue happen as a single step. Workers pull
//! with [`Frontier::next`], which parks until a target arrives or the crawl
//! is over.
//!
//! The crawl is over when the frontier is closed explicitly, or when the
//! queue is empty and no worker is still processing a target (nothing can
//! produce new work). Workers report finished targets with
//! [`Frontier::complete`].

use crate::storage::{FrontierStore, MemoryFrontierStore, StorageResult};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// A URL awaiting a visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// Absolute http(s) URL
    pub url: Url,

    /// Link hops from the seed this target was reached from
    pub depth: u32,

    /// Page the link was found on; `None` for seeds
    pub referrer: Option<Url>,
}

impl CrawlTarget {
    /// Creates a seed target at depth 0
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            referrer: None,
        }
    }
}

struct FrontierState {
    queue: VecDeque<CrawlTarget>,
    store: Box<dyn FrontierStore>,
    in_flight: usize,
    closed: bool,
}

/// Deduplicating FIFO work queue shared by all workers of a crawl
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    /// Creates a frontier whose visited set lives only in memory
    pub fn in_memory() -> Self {
        Self::with_queue(Box::new(MemoryFrontierStore::new()), VecDeque::new())
    }

    /// Creates a frontier backed by `store`
    ///
    /// Targets the store still holds as pending (from an interrupted run)
    /// are queued ahead of anything admitted later.
    pub fn open(store: Box<dyn FrontierStore>) -> StorageResult<Self> {
        let pending: VecDeque<CrawlTarget> = store.pending()?.into();
        if !pending.is_empty() {
            tracing::info!("Resuming {} pending targets", pending.len());
        }
        Ok(Self::with_queue(store, pending))
    }

    fn with_queue(store: Box<dyn FrontierStore>, queue: VecDeque<CrawlTarget>) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                queue,
                store,
                in_flight: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits `url` unless it has ever been admitted before
    ///
    /// Returns whether the URL was admitted. A closed frontier still records
    /// the admission so the target is pending for the next run, but will not
    /// hand it out.
    pub fn admit(&self, url: Url, depth: u32, referrer: Option<Url>) -> StorageResult<bool> {
        let target = CrawlTarget {
            url,
            depth,
            referrer,
        };

        let mut state = self.lock();
        if !state.store.admit(&target)? {
            tracing::trace!("Already visited: {}", target.url);
            return Ok(false);
        }

        tracing::trace!("Admitted {} at depth {}", target.url, target.depth);
        state.queue.push_back(target);
        drop(state);

        self.notify.notify_one();
        Ok(true)
    }

    /// Takes the oldest admitted target, waiting while other workers may
    /// still produce work
    ///
    /// Returns `None` once the frontier is closed, or once it is drained
    /// with nothing in flight (which closes it).
    pub async fn next(&self) -> Option<CrawlTarget> {
        loop {
            // Register before inspecting state so a wakeup between the check
            // and the await is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.poll_state() {
                return outcome;
            }

            notified.await;
        }
    }

    /// Takes the oldest admitted target without waiting
    pub fn try_next(&self) -> Option<CrawlTarget> {
        self.poll_state().flatten()
    }

    /// `Some(outcome)` when `next` can return, `None` when it must wait
    fn poll_state(&self) -> Option<Option<CrawlTarget>> {
        let mut state = self.lock();

        if state.closed {
            return Some(None);
        }

        if let Some(target) = state.queue.pop_front() {
            state.in_flight += 1;
            return Some(Some(target));
        }

        if state.in_flight == 0 {
            state.closed = true;
            drop(state);
            tracing::debug!("Frontier drained");
            self.notify.notify_waiters();
            return Some(None);
        }

        None
    }

    /// Marks a target handed out by `next` as finished
    ///
    /// The target leaves the store's pending queue. Its URL stays visited.
    pub fn complete(&self, target: &CrawlTarget) -> StorageResult<()> {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let result = state.store.complete(target.url.as_str());

        let drained = state.in_flight == 0 && state.queue.is_empty();
        if drained {
            state.closed = true;
        }
        drop(state);

        if drained {
            tracing::debug!("Frontier drained");
            self.notify.notify_waiters();
        }
        result
    }

    /// Stops handing out targets; parked `next` calls return `None`
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);

        tracing::debug!("Frontier closed");
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued targets not yet handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of targets handed out and not yet completed
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

impl fmt::Debug for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Frontier")
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}
