//! Shared run statistics and live per-download progress.
//!
//! [`StatsStore`] is the only place run-wide counters live. Workers and the
//! engine mutate it through a small set of operations; the progress renderer
//! reads consistent copies via [`StatsStore::snapshot`] and
//! [`StatsStore::active_downloads`]. No caller ever holds a reference into the
//! live state.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::scan::ScanSummary;

/// Below this elapsed time the overall speed is reported as zero.
const MIN_ELAPSED_FOR_SPEED: Duration = Duration::from_millis(100);

/// Below this speed (bytes/second) no ETA is estimated.
const MIN_SPEED_FOR_ETA: f64 = 100.0;

/// Named run counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Files known to the run (handed to the engine or filtered by the scan).
    FilesTotal,
    /// Files written (or counted in dry-run mode).
    FilesDownloaded,
    /// Files already present locally with the expected size.
    FilesSkippedExists,
    /// Files excluded by extension or size filters.
    FilesSkippedFilter,
    /// Files inside dependency/build folders.
    FilesSkippedDependency,
    /// Files that could not be downloaded.
    FilesFailed,
    /// Bytes of all files handed to the engine.
    BytesTotal,
    /// Bytes of downloaded files.
    BytesDownloaded,
    /// Bytes of files skipped because they already exist.
    BytesSkipped,
    /// Rate-limit responses received.
    RateLimitHits,
    /// Failed attempts.
    RetriesTotal,
}

/// A file currently being transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDownload {
    /// Monotonically assigned id, never reused within a run.
    pub slot: u64,
    /// Remote path.
    pub path: String,
    /// Expected size in bytes.
    pub total_bytes: u64,
    /// Bytes received in the current attempt.
    pub downloaded_bytes: u64,
    /// When the download was registered.
    pub start_time: Instant,
}

impl ActiveDownload {
    /// Progress of the current attempt in percent (0 for empty files).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

/// Copy of every counter plus the elapsed run time at the moment it was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub files_total: u64,
    pub files_downloaded: u64,
    pub files_skipped_exists: u64,
    pub files_skipped_filter: u64,
    pub files_skipped_dependency: u64,
    pub files_failed: u64,
    pub bytes_total: u64,
    pub bytes_downloaded: u64,
    pub bytes_skipped: u64,
    pub rate_limit_hits: u64,
    pub retries_total: u64,
    pub active_count: usize,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Files that reached a terminal bucket.
    #[must_use]
    pub fn files_processed(&self) -> u64 {
        self.files_downloaded
            + self.files_skipped_exists
            + self.files_skipped_filter
            + self.files_skipped_dependency
            + self.files_failed
    }

    /// True once every known file reached a terminal bucket.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.files_processed() >= self.files_total
    }

    /// Average transfer speed in bytes per second over the whole run.
    ///
    /// Zero during the first 100 ms to avoid a start-up spike.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn speed_bps(&self) -> f64 {
        if self.elapsed < MIN_ELAPSED_FOR_SPEED {
            return 0.0;
        }
        self.bytes_downloaded as f64 / self.elapsed.as_secs_f64()
    }

    /// Bytes neither downloaded nor skipped yet.
    #[must_use]
    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_total
            .saturating_sub(self.bytes_downloaded)
            .saturating_sub(self.bytes_skipped)
    }

    /// Estimated seconds until completion, or `None` while still calculating.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eta_seconds(&self) -> Option<f64> {
        let speed = self.speed_bps();
        if speed < MIN_SPEED_FOR_ETA {
            return None;
        }
        Some(self.bytes_remaining() as f64 / speed)
    }

    /// Fraction of `bytes_total` already downloaded or skipped, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn byte_fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        let done = self.bytes_downloaded.saturating_add(self.bytes_skipped);
        (done as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    counters: StatsSnapshot,
    active: BTreeMap<u64, ActiveDownload>,
    next_slot: u64,
}

impl Inner {
    fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
        let c = &mut self.counters;
        match counter {
            Counter::FilesTotal => &mut c.files_total,
            Counter::FilesDownloaded => &mut c.files_downloaded,
            Counter::FilesSkippedExists => &mut c.files_skipped_exists,
            Counter::FilesSkippedFilter => &mut c.files_skipped_filter,
            Counter::FilesSkippedDependency => &mut c.files_skipped_dependency,
            Counter::FilesFailed => &mut c.files_failed,
            Counter::BytesTotal => &mut c.bytes_total,
            Counter::BytesDownloaded => &mut c.bytes_downloaded,
            Counter::BytesSkipped => &mut c.bytes_skipped,
            Counter::RateLimitHits => &mut c.rate_limit_hits,
            Counter::RetriesTotal => &mut c.retries_total,
        }
    }
}

/// Thread-safe run statistics.
///
/// Every operation takes one short critical section, so concurrent increments
/// are never lost. Wrap in `Arc` to share between the engine, its workers and
/// the renderer.
#[derive(Debug)]
pub struct StatsStore {
    start_time: Instant,
    inner: Mutex<Inner>,
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsStore {
    /// Creates an empty store; the run clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// When the run started.
    #[must_use]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Adds one to `counter`.
    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Adds `delta` to `counter`.
    pub fn add(&self, counter: Counter, delta: u64) {
        let mut inner = self.lock();
        let value = inner.counter_mut(counter);
        *value = value.saturating_add(delta);
    }

    /// Reads one counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        *self.lock().counter_mut(counter)
    }

    /// Adds files handed to the engine to the run totals in one step.
    pub fn add_files(&self, count: u64, bytes: u64) {
        let mut inner = self.lock();
        let c = &mut inner.counters;
        c.files_total = c.files_total.saturating_add(count);
        c.bytes_total = c.bytes_total.saturating_add(bytes);
    }

    /// Records the files a scan filtered out.
    ///
    /// They count towards `files_total` and are already processed, so the
    /// completion invariant keeps holding.
    pub fn record_scan(&self, summary: &ScanSummary) {
        let mut inner = self.lock();
        let c = &mut inner.counters;
        let filtered = summary.skipped_dependency + summary.skipped_filter;
        c.files_total = c.files_total.saturating_add(filtered);
        c.files_skipped_dependency = c
            .files_skipped_dependency
            .saturating_add(summary.skipped_dependency);
        c.files_skipped_filter = c.files_skipped_filter.saturating_add(summary.skipped_filter);
    }

    /// Registers an in-flight download and returns its slot id.
    pub fn start_download(&self, path: &str, total_bytes: u64) -> u64 {
        let mut inner = self.lock();
        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.active.insert(
            slot,
            ActiveDownload {
                slot,
                path: path.to_string(),
                total_bytes,
                downloaded_bytes: 0,
                start_time: Instant::now(),
            },
        );
        slot
    }

    /// Updates progress for `slot`. Does nothing if the slot is gone.
    pub fn update_download(&self, slot: u64, downloaded_bytes: u64) {
        if let Some(active) = self.lock().active.get_mut(&slot) {
            active.downloaded_bytes = downloaded_bytes;
        }
    }

    /// Removes `slot` from the active set.
    pub fn finish_download(&self, slot: u64) {
        self.lock().active.remove(&slot);
    }

    /// Copy of the active set, ordered by slot id.
    #[must_use]
    pub fn active_downloads(&self) -> Vec<ActiveDownload> {
        self.lock().active.values().cloned().collect()
    }

    /// Copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();
        StatsSnapshot {
            active_count: inner.active.len(),
            elapsed: self.start_time.elapsed(),
            ..inner.counters.clone()
        }
    }

    /// Files that reached a terminal bucket.
    #[must_use]
    pub fn files_processed(&self) -> u64 {
        self.snapshot().files_processed()
    }

    /// True once every known file reached a terminal bucket.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.snapshot().is_complete()
    }

    /// Average speed in bytes per second.
    #[must_use]
    pub fn speed_bps(&self) -> f64 {
        self.snapshot().speed_bps()
    }

    /// Estimated seconds remaining.
    #[must_use]
    pub fn eta_seconds(&self) -> Option<f64> {
        self.snapshot().eta_seconds()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
