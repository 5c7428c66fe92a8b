//! Per-file download state machine.
//!
//! Each dispatched file is first checked against the stop signal, the local
//! destination and the run budget. Only then is the bounded retry loop
//! entered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, error, info, instrument, warn};

use super::StopSignal;
use super::transfer::{
    TransferError, destination_for, discard_partial, partial_path, stream_to_part,
};
use crate::download::rate_limiter::RateLimiter;
use crate::download::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::download::stats::{Counter, StatsStore};
use crate::remote::{FileDescriptor, RemoteSource};

/// Terminal state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOutcome {
    /// Written to its destination.
    Success,
    /// Counted as downloaded without touching the network.
    DryRun,
    /// Already present locally with the expected size.
    Exists,
    /// Every allowed attempt failed, or the failure was fatal.
    Failed,
    /// Not processed because the run byte budget ran out.
    Limited,
    /// Not processed (or abandoned) because the run is stopping.
    Cancelled,
}

/// Run-wide byte budget shared by all workers.
#[derive(Debug, Default)]
pub struct Budget {
    max_bytes: u64,
    used: AtomicU64,
    exhausted: AtomicBool,
}

impl Budget {
    /// Creates a budget of `max_bytes` (0 = unlimited).
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            used: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Whether some worker already marked the budget as spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Bytes downloaded against the budget so far.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Returns true if the budget is spent, marking it exhausted for every
    /// later caller. Exactly one caller observes the transition.
    pub fn check_exhausted(&self) -> bool {
        if self.is_exhausted() {
            return true;
        }
        if self.max_bytes == 0 || self.used() < self.max_bytes {
            return false;
        }
        if self
            .exhausted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(
                used = self.used(),
                max_bytes = self.max_bytes,
                "byte budget reached - no new downloads this run"
            );
        }
        true
    }

    /// Adds a finished download to the budget.
    pub fn record(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }
}

/// Everything a worker needs, shared across tasks.
pub(crate) struct WorkerContext {
    pub(crate) source: Arc<dyn RemoteSource>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) stats: Arc<StatsStore>,
    pub(crate) policy: RetryPolicy,
    pub(crate) budget: Arc<Budget>,
    pub(crate) stop: StopSignal,
    pub(crate) dest_root: PathBuf,
    pub(crate) chunk_size: usize,
    pub(crate) dry_run: bool,
}

/// Removes the slot from the active set however the worker exits.
struct ActiveSlot<'a> {
    stats: &'a StatsStore,
    slot: u64,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.stats.finish_download(self.slot);
    }
}

/// Runs one file through the state machine and records its outcome.
#[instrument(skip(ctx, file), fields(path = %file.path, size = file.size))]
pub(crate) async fn process_file(ctx: &WorkerContext, file: &FileDescriptor) -> FileOutcome {
    let outcome = evaluate(ctx, file).await;
    record_outcome(&ctx.stats, file, outcome);
    outcome
}

async fn evaluate(ctx: &WorkerContext, file: &FileDescriptor) -> FileOutcome {
    if ctx.stop.is_triggered() {
        return FileOutcome::Cancelled;
    }
    if ctx.budget.is_exhausted() {
        return FileOutcome::Limited;
    }

    let dest = destination_for(&ctx.dest_root, &file.path);
    if dest == ctx.dest_root {
        warn!(path = %file.path, "remote path has no usable file name");
        return FileOutcome::Failed;
    }

    if already_present(&dest, file.size).await {
        debug!(dest = %dest.display(), "already present with matching size");
        return FileOutcome::Exists;
    }

    if ctx.budget.check_exhausted() {
        return FileOutcome::Limited;
    }

    if ctx.dry_run {
        debug!(dest = %dest.display(), "dry run - not downloading");
        return FileOutcome::DryRun;
    }

    let outcome = download_with_retry(ctx, file, &dest).await;
    if outcome == FileOutcome::Success {
        ctx.budget.record(file.size);
    }
    outcome
}

async fn already_present(dest: &Path, size: u64) -> bool {
    match tokio::fs::metadata(dest).await {
        Ok(meta) => meta.is_file() && meta.len() == size,
        Err(_) => false,
    }
}

fn record_outcome(stats: &StatsStore, file: &FileDescriptor, outcome: FileOutcome) {
    match outcome {
        FileOutcome::Success | FileOutcome::DryRun => {
            stats.increment(Counter::FilesDownloaded);
            stats.add(Counter::BytesDownloaded, file.size);
        }
        FileOutcome::Exists => {
            stats.increment(Counter::FilesSkippedExists);
            stats.add(Counter::BytesSkipped, file.size);
        }
        FileOutcome::Failed => stats.increment(Counter::FilesFailed),
        FileOutcome::Limited | FileOutcome::Cancelled => {}
    }
}

/// The bounded retry loop. Restarts every attempt from byte 0.
async fn download_with_retry(ctx: &WorkerContext, file: &FileDescriptor, dest: &Path) -> FileOutcome {
    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "could not create destination directory");
            return FileOutcome::Failed;
        }
    }

    let part = partial_path(dest);
    let active = ActiveSlot {
        stats: &ctx.stats,
        slot: ctx.stats.start_download(&file.path, file.size),
    };

    let outcome = attempt_loop(ctx, file, dest, &part, active.slot).await;

    if outcome != FileOutcome::Success {
        discard_partial(&part).await;
    }
    outcome
}

async fn attempt_loop(
    ctx: &WorkerContext,
    file: &FileDescriptor,
    dest: &Path,
    part: &Path,
    slot: u64,
) -> FileOutcome {
    let mut attempt = 0u32;

    loop {
        if ctx.stop.is_triggered() {
            return FileOutcome::Cancelled;
        }

        tokio::select! {
            biased;
            () = ctx.stop.wait() => return FileOutcome::Cancelled,
            () = ctx.limiter.wait() => {}
        }
        ctx.stats.update_download(slot, 0);
        debug!(attempt, "attempting download");

        let result = match stream_to_part(
            ctx.source.as_ref(),
            &file.path,
            part,
            ctx.chunk_size,
            &ctx.stats,
            slot,
            &ctx.stop,
        )
        .await
        {
            Ok(_) => tokio::fs::rename(part, dest)
                .await
                .map_err(|e| TransferError::io(dest, e)),
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => {
                ctx.limiter.record_success();
                debug!(dest = %dest.display(), "download completed");
                return FileOutcome::Success;
            }
            Err(TransferError::Cancelled) => return FileOutcome::Cancelled,
            Err(e) => e,
        };

        let (failure_type, suggested) = match &error {
            TransferError::Remote(remote) => (classify_error(remote), remote.retry_after()),
            _ => (FailureType::Fatal, None),
        };

        ctx.stats.increment(Counter::RetriesTotal);
        if failure_type == FailureType::RateLimited {
            ctx.stats.increment(Counter::RateLimitHits);
            ctx.limiter.record_rate_limit();
        }

        discard_partial(part).await;

        match ctx.policy.should_retry(failure_type, attempt, suggested) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    path = %file.path,
                    attempt = next_attempt,
                    max_attempts = ctx.policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying download"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.stop.wait() => return FileOutcome::Cancelled,
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                error!(
                    path = %file.path,
                    attempts = attempt + 1,
                    %reason,
                    error = %error,
                    "download failed"
                );
                return FileOutcome::Failed;
            }
        }
    }
}
