//! Fixed-slot live progress block.
//!
//! The block is an indicatif [`MultiProgress`] holding exactly
//! `2 + max_slots` lines: an overall bar, a status line, and one bar per pool
//! slot. The bars are created once and only their values change between
//! ticks, so the block is redrawn in place and never scrolls.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{
    HumanBytes, HumanCount, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use super::format::{format_duration, format_speed, truncate_path};
use super::palette::Palette;
use crate::download::{
    ActiveDownload, LimiterSnapshot, RateLimiter, StatsSnapshot, StatsStore, StopSignal,
};

/// Default time between redraws.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

const OVERALL_TEMPLATE: &str = "  [{bar:40.cyan/blue}] {msg}";
const STATUS_TEMPLATE: &str = "  {msg}";
const SLOT_TEMPLATE: &str = "  #{prefix} [{bar:20.blue}] {msg}";
const BAR_CHARS: &str = "█░";
const SLOT_PATH_WIDTH: usize = 35;

/// Values for one bar of the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarLine {
    /// Filled amount.
    pub position: u64,
    /// Full amount; never zero so an empty bar stays empty.
    pub length: u64,
    /// Text drawn after the bar.
    pub message: String,
}

impl BarLine {
    fn new(done: u64, total: u64, message: String) -> Self {
        if total == 0 {
            return Self {
                position: 0,
                length: 1,
                message,
            };
        }
        Self {
            position: done.min(total),
            length: total,
            message,
        }
    }
}

/// Everything drawn in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Overall byte progress.
    pub overall: BarLine,
    /// Active count, throttle and stop markers, byte totals.
    pub status: String,
    /// One entry per pool slot, in slot order.
    pub slots: Vec<BarLine>,
}

impl Frame {
    /// Number of terminal lines the frame occupies.
    #[must_use]
    pub fn line_count(&self) -> usize {
        2 + self.slots.len()
    }
}

/// Drives the progress block from shared run state.
#[derive(Debug)]
pub struct ProgressRenderer {
    stats: Arc<StatsStore>,
    limiter: Arc<RateLimiter>,
    stop: Option<StopSignal>,
    palette: Palette,
    overall: ProgressBar,
    status: ProgressBar,
    slots: Vec<ProgressBar>,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(BAR_CHARS)
}

impl ProgressRenderer {
    /// Creates the block for a pool of `max_slots` workers, drawn to `target`.
    #[must_use]
    pub fn new(
        stats: Arc<StatsStore>,
        limiter: Arc<RateLimiter>,
        max_slots: usize,
        palette: Palette,
        target: ProgressDrawTarget,
    ) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        multi.set_move_cursor(true);
        let overall = multi.add(ProgressBar::new(1).with_style(style(OVERALL_TEMPLATE)));
        let status = multi.add(ProgressBar::new(1).with_style(style(STATUS_TEMPLATE)));
        let slots = (1..=max_slots)
            .map(|number| {
                multi.add(
                    ProgressBar::new(1)
                        .with_style(style(SLOT_TEMPLATE))
                        .with_prefix(number.to_string()),
                )
            })
            .collect();

        Self {
            stats,
            limiter,
            stop: None,
            palette,
            overall,
            status,
            slots,
        }
    }

    /// Shows `[Stopping]` on the status line once `stop` is triggered.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Number of terminal lines the block occupies.
    #[must_use]
    pub fn total_lines(&self) -> usize {
        2 + self.slots.len()
    }

    /// The frame for the current run state.
    #[must_use]
    pub fn frame(&self) -> Frame {
        let stopping = self.stop.as_ref().is_some_and(StopSignal::is_triggered);
        compose_frame(
            &self.stats.snapshot(),
            self.limiter.snapshot(),
            &self.stats.active_downloads(),
            self.slots.len(),
            stopping,
            self.palette,
        )
    }

    /// Applies the current frame to the bars.
    pub fn refresh(&self) {
        let frame = self.frame();
        apply(&self.overall, &frame.overall);
        self.status.set_message(frame.status);
        for (bar, line) in self.slots.iter().zip(&frame.slots) {
            apply(bar, line);
        }
    }

    /// Refreshes every `interval` on a background task until
    /// [`RendererHandle::stop`] draws the final frame.
    #[must_use]
    pub fn spawn(self, interval: Duration) -> RendererHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => self.refresh(),
                }
            }

            self.refresh();
            self.finish();
        });

        RendererHandle {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Leaves every bar on screen at its last values.
    fn finish(&self) {
        self.overall.abandon();
        self.status.abandon();
        for bar in &self.slots {
            bar.abandon();
        }
    }
}

fn apply(bar: &ProgressBar, line: &BarLine) {
    bar.set_length(line.length);
    bar.set_position(line.position);
    bar.set_message(line.message.clone());
}

/// Controls a running renderer task.
#[derive(Debug)]
pub struct RendererHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RendererHandle {
    /// Draws a final frame and waits for the task.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            debug!(error = %e, "progress renderer task ended abnormally");
        }
    }
}

/// Builds one frame from snapshots.
#[must_use]
pub fn compose_frame(
    snapshot: &StatsSnapshot,
    limiter: LimiterSnapshot,
    active: &[ActiveDownload],
    max_slots: usize,
    stopping: bool,
    p: Palette,
) -> Frame {
    let percent = snapshot.byte_fraction() * 100.0;
    let overall = BarLine::new(
        snapshot.bytes_downloaded.saturating_add(snapshot.bytes_skipped),
        snapshot.bytes_total,
        format!(
            "{percent:5.1}%  {:>12}  ETA: {:<14}  Files: {}/{}",
            format_speed(snapshot.speed_bps()),
            format_duration(snapshot.eta_seconds()),
            HumanCount(snapshot.files_processed()),
            HumanCount(snapshot.files_total),
        ),
    );

    let mut markers = String::new();
    if limiter.throttled {
        markers.push_str(&format!(" {}[Throttled]{}", p.yellow, p.reset));
    }
    if stopping {
        markers.push_str(&format!(" {}[Stopping]{}", p.red, p.reset));
    }
    let status = format!(
        "{}Active: {}/{max_slots}{}{markers}  Downloaded: {}{}{} / {}",
        p.dim,
        snapshot.active_count.min(max_slots),
        p.reset,
        p.green,
        HumanBytes(snapshot.bytes_downloaded),
        p.reset,
        HumanBytes(snapshot.bytes_total),
    );

    let slots = (0..max_slots)
        .map(|row| match active.get(row) {
            Some(download) => BarLine::new(
                download.downloaded_bytes,
                download.total_bytes,
                format!(
                    "{:5.1}% {:>10}/{:<10} {}",
                    download.progress_percent(),
                    HumanBytes(download.downloaded_bytes).to_string(),
                    HumanBytes(download.total_bytes).to_string(),
                    truncate_path(&download.path, SLOT_PATH_WIDTH),
                ),
            ),
            None => BarLine::new(0, 0, format!("{}--.-% (waiting){}", p.dim, p.reset)),
        })
        .collect();

    Frame {
        overall,
        status,
        slots,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn renderer(slots: usize) -> (ProgressRenderer, Arc<StatsStore>, Arc<RateLimiter>) {
        let stats = Arc::new(StatsStore::new());
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let r = ProgressRenderer::new(
            Arc::clone(&stats),
            Arc::clone(&limiter),
            slots,
            Palette::PLAIN,
            ProgressDrawTarget::hidden(),
        );
        (r, stats, limiter)
    }

    #[test]
    fn test_frame_has_two_plus_slots_lines() {
        let (r, _, _) = renderer(4);
        let frame = r.frame();
        assert_eq!(frame.line_count(), 6);
        assert_eq!(r.total_lines(), 6);
        assert!(frame.slots.iter().all(|s| s.message.contains("(waiting)")));
    }

    #[test]
    fn test_empty_run_renders_degenerate_values() {
        let (r, _, _) = renderer(1);
        let frame = r.frame();
        assert_eq!((frame.overall.position, frame.overall.length), (0, 1));
        assert!(frame.overall.message.contains("0.0%"));
        assert!(frame.overall.message.contains("calculating..."));
        assert!(frame.overall.message.contains("Files: 0/0"));
        assert!(!frame.status.contains("[Throttled]"));
        assert!(!frame.status.contains("[Stopping]"));
    }

    #[test]
    fn test_rows_follow_active_order_and_backfill() {
        let (r, stats, _) = renderer(2);
        let a = stats.start_download("/a.bin", 100);
        let _b = stats.start_download("/b.bin", 100);
        let _c = stats.start_download("/c.bin", 100);

        let frame = r.frame();
        assert!(frame.slots[0].message.contains("/a.bin"));
        assert!(frame.slots[1].message.contains("/b.bin"));
        assert!(frame.status.contains("Active: 2/2"));

        stats.finish_download(a);
        let frame = r.frame();
        assert!(frame.slots[0].message.contains("/b.bin"));
        assert!(frame.slots[1].message.contains("/c.bin"));
    }

    #[test]
    fn test_slot_row_shows_progress_and_truncated_path() {
        let (r, stats, _) = renderer(1);
        let long = format!("/very/long/{}/file.dat", "x".repeat(60));
        let slot = stats.start_download(&long, 200);
        stats.update_download(slot, 50);

        let row = &r.frame().slots[0];
        assert_eq!((row.position, row.length), (50, 200));
        assert!(row.message.contains(" 25.0%"), "{}", row.message);
        assert!(row.message.contains("...") && row.message.ends_with("/file.dat"));
    }

    #[test]
    fn test_status_markers() {
        let (r, _, limiter) = renderer(1);
        let stop = StopSignal::new();
        let r = r.with_stop_signal(stop.clone());
        limiter.record_rate_limit();
        limiter.record_rate_limit();
        assert!(r.frame().status.contains("[Throttled]"));
        assert!(!r.frame().status.contains("[Stopping]"));

        stop.trigger();
        assert!(r.frame().status.contains("[Stopping]"));
    }

    #[test]
    fn test_refresh_updates_bars_in_place() {
        let (r, stats, _) = renderer(2);
        let slot = stats.start_download("/a.bin", 400);
        stats.update_download(slot, 100);

        r.refresh();
        r.refresh();

        assert_eq!(r.slots.len(), 2);
        assert_eq!(r.slots[0].position(), 100);
        assert_eq!(r.slots[0].length(), Some(400));
        assert_eq!(r.slots[0].prefix(), "1");
        assert!(r.slots[0].message().contains("/a.bin"));
        assert!(r.slots[1].message().contains("(waiting)"));
        assert!(r.status.message().contains("Active: 1/2"));
    }

    #[tokio::test]
    async fn test_spawned_renderer_finishes_bars_on_stop() {
        let (r, stats, _) = renderer(1);
        let overall = r.overall.clone();
        let slot = r.slots[0].clone();
        let handle = r.spawn(Duration::from_millis(10));
        let id = stats.start_download("/late.bin", 10);
        stats.update_download(id, 10);
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;

        assert!(overall.is_finished());
        assert!(slot.is_finished());
        assert!(slot.message().contains("/late.bin"));
        assert_eq!(slot.position(), 10);
    }
}
