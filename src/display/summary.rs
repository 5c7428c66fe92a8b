//! Section headers, status lines and the end-of-run summary.

use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

use indicatif::{HumanBytes, HumanCount};

use super::format::{format_duration, format_speed};
use super::palette::Palette;
use crate::download::StatsSnapshot;
use crate::scan::ScanSummary;

const RULE_WIDTH: usize = 60;
const HEADER_WIDTH: usize = 76;

/// Throughput assumed per worker when estimating a run's duration.
const ESTIMATED_BYTES_PER_WORKER: f64 = 2.0 * 1024.0 * 1024.0;

/// `─── TEXT ─────...` section header.
#[must_use]
pub fn header(text: &str, p: Palette) -> String {
    let tail = HEADER_WIDTH.saturating_sub(text.chars().count() + 5);
    format!("\n{}{}─── {text} {}{}", p.magenta, p.bold, "─".repeat(tail), p.reset)
}

/// `  ✓ text`
#[must_use]
pub fn success(text: &str, p: Palette) -> String {
    format!("  {}✓{} {text}", p.green, p.reset)
}

/// `  ⚠ text`
#[must_use]
pub fn warning(text: &str, p: Palette) -> String {
    format!("  {}⚠{} {text}", p.yellow, p.reset)
}

/// `  ✗ text`
#[must_use]
pub fn failure(text: &str, p: Palette) -> String {
    format!("  {}✗{} {text}", p.red, p.reset)
}

/// `  ℹ text`
#[must_use]
pub fn info(text: &str, p: Palette) -> String {
    format!("  {}ℹ{} {text}", p.cyan, p.reset)
}

/// Block printed before downloads start.
#[must_use]
pub fn run_header(started: SystemTime, workers: usize, dry_run: bool, p: Palette) -> String {
    let mut out = header("Downloading", p);
    out.push('\n');
    if dry_run {
        let _ = writeln!(out, "{}", warning("DRY RUN MODE - No files will be downloaded", p));
    }
    let _ = writeln!(out, "{}", info(&format!("Started: {}", httpdate::fmt_http_date(started)), p));
    let _ = writeln!(out, "{}", info(&format!("Workers: {workers}"), p));
    out
}

/// One-line scan status: `N scanned | K to download (size) | R/s`.
#[must_use]
pub fn scan_progress(summary: &ScanSummary, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let rate = if secs > 0.0 {
        summary.scanned as f64 / secs
    } else {
        0.0
    };
    format!(
        "{} scanned | {} to download ({}) | {rate:.0}/s",
        HumanCount(summary.scanned),
        HumanCount(summary.files_to_download()),
        HumanBytes(summary.bytes_to_download),
    )
}

/// Rough run duration for `bytes` spread over `workers`, or `None` when
/// there is nothing to download.
#[must_use]
pub fn estimated_time(bytes: u64, workers: usize) -> Option<String> {
    if bytes == 0 || workers == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let seconds = bytes as f64 / (workers as f64 * ESTIMATED_BYTES_PER_WORKER);
    Some(format_duration(Some(seconds)))
}

/// Block printed after the scan.
#[must_use]
pub fn scan_report(
    summary: &ScanSummary,
    files: usize,
    truncated: bool,
    workers: usize,
    p: Palette,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", success("Scan complete!", p));
    if truncated {
        let _ = writeln!(out, "{}", warning("Listing ended early - some files were not seen", p));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "    Total scanned:      {}", HumanCount(summary.scanned));
    let _ = writeln!(
        out,
        "    {}To download:{}         {} ({})",
        p.green,
        p.reset,
        HumanCount(files as u64),
        HumanBytes(summary.bytes_to_download)
    );
    let _ = writeln!(
        out,
        "    {}Skipped (deps):{}     {}",
        p.magenta,
        p.reset,
        HumanCount(summary.skipped_dependency)
    );
    let _ = writeln!(
        out,
        "    {}Skipped (other):{}    {}",
        p.yellow,
        p.reset,
        HumanCount(summary.skipped_filter)
    );
    let estimate = estimated_time(summary.bytes_to_download, workers).filter(|_| files > 0);
    if let Some(estimate) = estimate {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", info(&format!("Estimated time: ~{estimate}"), p));
    }
    out
}

/// The end-of-run summary: timing, per-bucket counts, throttling totals and
/// a closing verdict.
#[must_use]
pub fn run_summary(stats: &StatsSnapshot, interrupted: bool, p: Palette) -> String {
    let mut out = String::new();

    let title = if interrupted {
        format!("{}BACKUP INTERRUPTED{}", p.yellow, p.reset)
    } else {
        format!("{}BACKUP COMPLETE{}", p.green, p.reset)
    };
    let _ = writeln!(out, "{}", header(&title, p));
    let _ = writeln!(out);

    let speed = stats.speed_bps();
    let avg_speed = if speed > 0.0 {
        format_speed(speed)
    } else {
        "N/A".to_string()
    };
    let _ = writeln!(out, "  {}Performance{}", p.bold, p.reset);
    let _ = writeln!(
        out,
        "    Completed:    {}",
        httpdate::fmt_http_date(SystemTime::now())
    );
    let _ = writeln!(
        out,
        "    Duration:     {}",
        format_duration(Some(stats.elapsed.as_secs_f64()))
    );
    let _ = writeln!(out, "    Avg Speed:    {avg_speed}");
    let _ = writeln!(out);

    let _ = writeln!(out, "  {}Files{}", p.bold, p.reset);
    let _ = writeln!(
        out,
        "    {}Downloaded:{}   {} ({})",
        p.green,
        p.reset,
        HumanCount(stats.files_downloaded),
        HumanBytes(stats.bytes_downloaded)
    );
    let _ = writeln!(
        out,
        "    {}Already had:{}  {} ({})",
        p.blue,
        p.reset,
        HumanCount(stats.files_skipped_exists),
        HumanBytes(stats.bytes_skipped)
    );
    let _ = writeln!(
        out,
        "    {}Filtered:{}     {}",
        p.yellow,
        p.reset,
        HumanCount(stats.files_skipped_filter)
    );
    let _ = writeln!(
        out,
        "    {}Dependencies:{} {}",
        p.magenta,
        p.reset,
        HumanCount(stats.files_skipped_dependency)
    );
    if stats.files_failed > 0 {
        let _ = writeln!(
            out,
            "    {}Failed:{}       {}",
            p.red,
            p.reset,
            HumanCount(stats.files_failed)
        );
    }
    let _ = writeln!(out);

    if stats.rate_limit_hits > 0 || stats.retries_total > 0 {
        let _ = writeln!(out, "  {}Rate Limiting{}", p.bold, p.reset);
        let _ = writeln!(
            out,
            "    Hits: {}  Retries: {}",
            stats.rate_limit_hits, stats.retries_total
        );
        let _ = writeln!(out);
    }

    let rule = format!("  {}", "─".repeat(RULE_WIDTH));
    let _ = writeln!(out, "{rule}");
    let verdict = if interrupted {
        warning("Interrupted. Run again to continue.", p)
    } else if stats.files_failed > 0 {
        warning(
            &format!(
                "Completed with {} failures. Check log.",
                stats.files_failed
            ),
            p,
        )
    } else {
        success(&format!("{}All done!{} Files safely backed up.", p.bold, p.reset), p)
    };
    let _ = writeln!(out, "{verdict}");
    let _ = writeln!(out, "{rule}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_pads_to_width() {
        let h = header("Downloading", Palette::PLAIN);
        assert!(h.starts_with("\n─── Downloading ─"));
        assert_eq!(h.trim_start().chars().count(), HEADER_WIDTH);
    }

    #[test]
    fn test_summary_complete_without_failures() {
        let stats = StatsSnapshot {
            files_total: 3,
            files_downloaded: 2,
            files_skipped_exists: 1,
            bytes_downloaded: 2048,
            bytes_skipped: 10,
            elapsed: Duration::from_secs(75),
            ..StatsSnapshot::default()
        };
        let text = run_summary(&stats, false, Palette::PLAIN);
        assert!(text.contains("BACKUP COMPLETE"));
        assert!(text.contains("Duration:     1m 15s"));
        assert!(text.contains("Downloaded:   2 (2.00 KiB)"));
        assert!(text.contains("All done!"));
        assert!(!text.contains("Failed:"));
        assert!(!text.contains("Rate Limiting"));
    }

    #[test]
    fn test_summary_reports_failures_and_throttling() {
        let stats = StatsSnapshot {
            files_failed: 2,
            rate_limit_hits: 4,
            retries_total: 7,
            ..StatsSnapshot::default()
        };
        let text = run_summary(&stats, false, Palette::PLAIN);
        assert!(text.contains("Failed:       2"));
        assert!(text.contains("Hits: 4  Retries: 7"));
        assert!(text.contains("Completed with 2 failures"));
        assert!(text.contains("Avg Speed:    N/A"));
    }

    #[test]
    fn test_summary_interrupted_wins_over_failures() {
        let stats = StatsSnapshot {
            files_failed: 1,
            ..StatsSnapshot::default()
        };
        let text = run_summary(&stats, true, Palette::PLAIN);
        assert!(text.contains("BACKUP INTERRUPTED"));
        assert!(text.contains("Interrupted. Run again to continue."));
    }

    #[test]
    fn test_run_header_mentions_dry_run() {
        let text = run_header(SystemTime::now(), 6, true, Palette::PLAIN);
        assert!(text.contains("DRY RUN MODE"));
        assert!(text.contains("Workers: 6"));
        assert!(!run_header(SystemTime::now(), 6, false, Palette::PLAIN).contains("DRY RUN"));
    }

    #[test]
    fn test_scan_report_counts() {
        let summary = ScanSummary {
            scanned: 1500,
            skipped_dependency: 3,
            skipped_filter: 2,
            bytes_to_download: 1024,
        };
        let text = scan_report(&summary, 1495, false, 6, Palette::PLAIN);
        assert!(text.contains("Total scanned:      1,500"));
        assert!(text.contains("To download:         1,495 (1.00 KiB)"));
        assert!(text.contains("Estimated time: ~0s"));
        assert!(!text.contains("ended early"));
    }

    #[test]
    fn test_scan_report_without_files_has_no_estimate() {
        let summary = ScanSummary {
            scanned: 4,
            skipped_dependency: 4,
            ..ScanSummary::default()
        };
        let text = scan_report(&summary, 0, true, 6, Palette::PLAIN);
        assert!(text.contains("ended early"));
        assert!(!text.contains("Estimated time"));
    }

    #[test]
    fn test_scan_progress_line() {
        let summary = ScanSummary {
            scanned: 12_000,
            skipped_dependency: 1_500,
            skipped_filter: 500,
            bytes_to_download: 3 * 1024 * 1024,
        };
        let line = scan_progress(&summary, Duration::from_secs(4));
        assert_eq!(line, "12,000 scanned | 10,000 to download (3.00 MiB) | 3000/s");
        assert!(scan_progress(&ScanSummary::default(), Duration::ZERO).ends_with("| 0/s"));
    }

    #[test]
    fn test_estimated_time_assumes_two_mib_per_worker() {
        // 6 workers at 2 MiB/s move 12 MiB per second.
        assert_eq!(estimated_time(12 * 1024 * 1024 * 90, 6).as_deref(), Some("1m 30s"));
        assert_eq!(estimated_time(0, 6), None);
        assert_eq!(estimated_time(1024, 0), None);
    }
}
