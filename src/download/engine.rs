//! Download engine for concurrent file downloads with retry support.
//!
//! This module provides the [`Engine`] which coordinates concurrent downloads
//! using a semaphore-based concurrency control pattern, with automatic retry
//! on transient failures using full-jitter exponential backoff.
//!
//! # Overview
//!
//! The engine takes an already-filtered list of [`FileDescriptor`]s and
//! streams each one from a [`RemoteSource`] into the destination tree, with a
//! shared [`RateLimiter`], [`StatsStore`], byte budget and [`StopSignal`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use backup_core::download::{Engine, EngineConfig, RateLimiter, StatsStore, StopSignal};
//! use backup_core::remote::{DropboxClient, FileDescriptor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(DropboxClient::new("sl.token", 300)?);
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)));
//! let stats = Arc::new(StatsStore::new());
//! let config = EngineConfig::new("./backup");
//! let engine = Engine::new(config, client, limiter, stats)?;
//!
//! let files = vec![FileDescriptor::new("/Photos/a.jpg", 1024)];
//! let report = engine.run(files, &StopSignal::new()).await;
//! println!("downloaded {}, failed {}", report.downloaded, report.failed);
//! # Ok(())
//! # }
//! ```

mod transfer;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, instrument};

pub use transfer::{destination_for, partial_path};
pub use worker::{Budget, FileOutcome};

use super::constants::{DEFAULT_CHUNK_SIZE, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::stats::{Counter, StatsStore};
use crate::remote::{FileDescriptor, RemoteSource};
use worker::{WorkerContext, process_file};

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Cloneable, process-wide stop flag.
///
/// Checked when a file is dispatched, at every streamed chunk and during
/// retry sleeps. Triggering it is idempotent.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns true only for the call that set it.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.triggered.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether the flag is set.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Completes once the flag is set.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Settings the engine consumes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size (1-20).
    pub max_concurrent_downloads: usize,
    /// Write buffer size per download.
    pub download_chunk_size: usize,
    /// Attempts and backoff per file.
    pub retry_policy: RetryPolicy,
    /// Byte budget for this run (0 = unlimited).
    pub max_bytes_per_run: u64,
    /// Count files as downloaded without fetching them.
    pub dry_run: bool,
    /// Local directory mirroring the remote tree.
    pub dest_root: PathBuf,
}

impl EngineConfig {
    /// Default settings writing below `dest_root`.
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            max_concurrent_downloads: super::constants::DEFAULT_CONCURRENCY,
            download_chunk_size: DEFAULT_CHUNK_SIZE,
            retry_policy: RetryPolicy::default(),
            max_bytes_per_run: 0,
            dry_run: false,
            dest_root: dest_root.into(),
        }
    }
}

/// Terminal outcome counts for one [`Engine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files written.
    pub downloaded: usize,
    /// Files counted in dry-run mode.
    pub dry_run: usize,
    /// Files already present.
    pub skipped_exists: usize,
    /// Files that failed (including worker panics).
    pub failed: usize,
    /// Files skipped because the byte budget ran out.
    pub limited: usize,
    /// Files abandoned or never started because of the stop signal.
    pub cancelled: usize,
    /// The stop signal was observed during the run.
    pub interrupted: bool,
    /// The byte budget was reached during the run.
    pub budget_exhausted: bool,
}

impl RunReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Success => self.downloaded += 1,
            FileOutcome::DryRun => self.dry_run += 1,
            FileOutcome::Exists => self.skipped_exists += 1,
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Limited => self.limited += 1,
            FileOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Download engine for concurrent file downloads with retry support.
///
/// # Concurrency Model
///
/// - Each file runs in its own Tokio task
/// - A semaphore permit is acquired before a file's task is spawned, so
///   files beyond the pool size are never started early
/// - Permits are released automatically when tasks complete (RAII)
/// - All tasks share one [`RateLimiter`] which paces request starts
pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn RemoteSource>,
    limiter: Arc<RateLimiter>,
    stats: Arc<StatsStore>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the pool size is outside
    /// the valid range (1-20).
    #[instrument(level = "debug", skip_all, fields(concurrency = config.max_concurrent_downloads))]
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn RemoteSource>,
        limiter: Arc<RateLimiter>,
        stats: Arc<StatsStore>,
    ) -> Result<Self, EngineError> {
        let concurrency = config.max_concurrent_downloads;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_retries = config.retry_policy.max_attempts(),
            min_delay_ms = limiter.min_delay().as_millis(),
            dry_run = config.dry_run,
            "creating download engine"
        );

        Ok(Self {
            config,
            source,
            limiter,
            stats,
        })
    }

    /// Returns the configured pool size.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.max_concurrent_downloads
    }

    /// Returns the engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Downloads every file in `files`.
    ///
    /// Individual failures never abort the run; they are counted in the
    /// returned report and in the shared [`StatsStore`]. Once `stop` is
    /// triggered no further file is started, and files already started
    /// unwind at their next chunk or retry boundary.
    #[instrument(skip_all, fields(files = files.len(), dest = %self.config.dest_root.display()))]
    pub async fn run(&self, files: Vec<FileDescriptor>, stop: &StopSignal) -> RunReport {
        let total_bytes = files.iter().map(|f| f.size).sum();
        self.stats.add_files(files.len() as u64, total_bytes);

        let budget = Arc::new(Budget::new(self.config.max_bytes_per_run));
        let ctx = Arc::new(WorkerContext {
            source: Arc::clone(&self.source),
            limiter: Arc::clone(&self.limiter),
            stats: Arc::clone(&self.stats),
            policy: self.config.retry_policy.clone(),
            budget: Arc::clone(&budget),
            stop: stop.clone(),
            dest_root: self.config.dest_root.clone(),
            chunk_size: self.config.download_chunk_size,
            dry_run: self.config.dry_run,
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads));
        let mut report = RunReport::default();
        let mut handles = Vec::with_capacity(files.len());
        let file_count = files.len();

        info!(files = file_count, total_bytes, "starting downloads");

        for file in files {
            let permit = tokio::select! {
                biased;
                () = stop.wait() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                break;
            };
            if stop.is_triggered() {
                break;
            }

            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_file(&ctx, &file).await
            }));
        }

        let not_started = file_count - handles.len();
        if not_started > 0 {
            debug!(not_started, "stop requested - remaining files not dispatched");
        }
        report.cancelled += not_started;

        for handle in handles {
            match handle.await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "download task panicked");
                    self.stats.increment(Counter::FilesFailed);
                    report.failed += 1;
                }
            }
        }

        report.interrupted = stop.is_triggered();
        report.budget_exhausted = budget.is_exhausted();

        info!(
            downloaded = report.downloaded,
            skipped_exists = report.skipped_exists,
            failed = report.failed,
            cancelled = report.cancelled,
            limited = report.limited,
            interrupted = report.interrupted,
            "downloads finished"
        );

        report
    }
}
