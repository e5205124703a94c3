use std::collections::{BTreeMap, BTreeSet};

use runtime::budget::SlotBudget;
use runtime::work_queue::{WorkId, WorkQueue};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ImageCacheConfig {
    /// Maximum number of cached thumbnail URLs.
    pub capacity: usize,
    /// Cleanup is skipped below this occupancy, as a fraction of capacity.
    pub cleanup_occupancy: f64,
    /// Fraction of capacity whose most recently used entries survive cleanup
    /// regardless of visibility.
    pub cleanup_keep_recent: f64,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            cleanup_occupancy: 0.8,
            cleanup_keep_recent: 0.3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadPriority {
    Normal,
    High,
}

/// Result of one `acquire` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// Already cached; the entry was promoted to most recently used.
    Hit,
    /// A load for this URL is already in flight; the caller shares its
    /// settlement. A high-priority acquire promotes the queued load.
    Joined,
    /// A new load was queued; the host must perform it and settle it via
    /// [`ImageCache::complete_load`].
    Enqueued,
}

/// One settled load, reported back to every waiter exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSettled {
    /// How many acquires were waiting on this load.
    pub waiters: u32,
    /// Whether a cache entry was created.
    pub cached: bool,
    /// Entries evicted to make room, least recently used first.
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Completion for a URL with no load in flight.
    UnknownLoad,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::UnknownLoad => write!(f, "no image load in flight for url"),
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug)]
struct PendingLoad {
    work_id: WorkId,
    waiters: u32,
}

/// Bounded LRU cache of thumbnail image URLs.
///
/// Recency is a monotonic tick rather than wall-clock time, so eviction is
/// deterministic; ties are broken by URL ordering. In-flight loads live in a
/// pending registry keyed by URL and settle exactly once; callers never
/// poll. The cache itself performs no I/O: the host pops queued loads,
/// fetches the bytes, and reports the outcome.
#[derive(Debug)]
pub struct ImageCache {
    config: ImageCacheConfig,
    tick: u64,
    entries: BTreeMap<String, u64>,
    load_queue: WorkQueue<String>,
    pending: BTreeMap<String, PendingLoad>,
}

impl ImageCache {
    pub fn new(config: ImageCacheConfig) -> Self {
        Self {
            config,
            tick: 0,
            entries: BTreeMap::new(),
            load_queue: WorkQueue::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> ImageCacheConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn is_load_pending(&self, url: &str) -> bool {
        self.pending.contains_key(url)
    }

    pub fn queued_loads(&self) -> usize {
        self.load_queue.len()
    }

    /// Requests `url`, promoting on hit and queueing a load on miss.
    pub fn acquire(&mut self, url: &str, priority: LoadPriority) -> Acquire {
        self.tick += 1;

        if let Some(last_used) = self.entries.get_mut(url) {
            *last_used = self.tick;
            return Acquire::Hit;
        }

        if let Some(pending) = self.pending.get_mut(url) {
            pending.waiters += 1;
            if priority == LoadPriority::High {
                self.load_queue.promote(pending.work_id);
            }
            return Acquire::Joined;
        }

        let work_id = self.load_queue.push(0, url.to_string());
        if priority == LoadPriority::High {
            self.load_queue.promote(work_id);
        }
        self.pending.insert(
            url.to_string(),
            PendingLoad {
                work_id,
                waiters: 1,
            },
        );
        Acquire::Enqueued
    }

    /// Hands the host the next image URL to load.
    pub fn next_load(&mut self) -> Option<String> {
        let (_, _, url) = self.load_queue.pop_next()?;
        Some(url)
    }

    /// Budget-limited variant for idle prefetching.
    pub fn next_load_with_budget(&mut self, budget: &mut SlotBudget) -> Option<String> {
        let (_, _, url) = self.load_queue.pop_next_with_budget(budget)?;
        Some(url)
    }

    /// Settles an in-flight load.
    ///
    /// Success inserts the entry and evicts least-recently-used entries past
    /// capacity. Failure records nothing, so a later acquire may retry;
    /// callers are expected to fall back to a placeholder.
    pub fn complete_load(&mut self, url: &str, ok: bool) -> Result<LoadSettled, CacheError> {
        let pending = self.pending.remove(url).ok_or(CacheError::UnknownLoad)?;
        // The host may settle a load it never popped (e.g. it raced a
        // direct click-load); drop any stale queue item.
        self.load_queue.cancel(pending.work_id);

        let mut evicted = Vec::new();
        if ok {
            self.tick += 1;
            self.entries.insert(url.to_string(), self.tick);
            while self.entries.len() > self.config.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by(|(ka, ta), (kb, tb)| ta.cmp(tb).then_with(|| ka.cmp(kb)))
                    .map(|(k, _)| k.clone());
                let Some(oldest) = oldest else {
                    break;
                };
                self.entries.remove(&oldest);
                evicted.push(oldest);
            }
        }

        Ok(LoadSettled {
            waiters: pending.waiters,
            cached: ok,
            evicted,
        })
    }

    /// Periodic retention pass, triggered by the host's cleanup timer.
    ///
    /// Skipped below the configured occupancy. Retains `protected` URLs
    /// (visible markers plus the open detail view) and the most recently
    /// used slice of the queue; evicts everything else. Returns the evicted
    /// URLs.
    pub fn cleanup(&mut self, protected: &BTreeSet<String>) -> Vec<String> {
        let threshold =
            (self.config.capacity as f64 * self.config.cleanup_occupancy).ceil() as usize;
        if self.entries.len() < threshold {
            return Vec::new();
        }

        let keep_recent =
            (self.config.capacity as f64 * self.config.cleanup_keep_recent).floor() as usize;
        let mut by_recency: Vec<(&String, u64)> =
            self.entries.iter().map(|(k, t)| (k, *t)).collect();
        by_recency.sort_by(|(ka, ta), (kb, tb)| tb.cmp(ta).then_with(|| ka.cmp(kb)));
        let recent: BTreeSet<String> = by_recency
            .into_iter()
            .take(keep_recent)
            .map(|(k, _)| k.clone())
            .collect();

        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|url| !protected.contains(*url) && !recent.contains(*url))
            .cloned()
            .collect();
        for url in &doomed {
            self.entries.remove(url);
        }
        doomed
    }
}
