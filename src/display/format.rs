//! Text helpers shared by the live display and the summary.

use indicatif::HumanBytes;

/// `Ns` under a minute, `Nm Ns` under an hour, `Nh Nm` beyond.
///
/// `None` renders as `calculating...`.
#[must_use]
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return "calculating...".to_string();
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return "unknown".to_string();
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = seconds as u64;
    if total < 60 {
        format!("{total}s")
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

/// Human transfer rate such as `2.50 MiB/s`.
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
        bytes_per_sec as u64
    } else {
        0
    };
    format!("{}/s", HumanBytes(bytes))
}

/// Keeps the end of `path`, prefixing `...` when it is longer than `max`
/// characters.
#[must_use]
pub fn truncate_path(path: &str, max: usize) -> String {
    let len = path.chars().count();
    if len <= max {
        return path.to_string();
    }
    let keep = max.saturating_sub(3);
    let tail: String = path.chars().skip(len - keep).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(None), "calculating...");
        assert_eq!(format_duration(Some(0.4)), "0s");
        assert_eq!(format_duration(Some(59.9)), "59s");
        assert_eq!(format_duration(Some(61.0)), "1m 1s");
        assert_eq!(format_duration(Some(3599.0)), "59m 59s");
        assert_eq!(format_duration(Some(3600.0 * 2.0 + 15.0 * 60.0 + 30.0)), "2h 15m");
        assert_eq!(format_duration(Some(-1.0)), "unknown");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(0.0), "0 B/s");
        assert_eq!(format_speed(f64::INFINITY), "0 B/s");
        assert!(format_speed(2.5 * 1024.0 * 1024.0).starts_with("2.50 MiB"));
    }

    #[test]
    fn test_truncate_path_keeps_tail() {
        assert_eq!(truncate_path("/short.txt", 35), "/short.txt");
        let long = "/Photos/2024/Summer/Holiday/Beach/IMG_0001.jpg";
        let cut = truncate_path(long, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.starts_with("..."));
        assert!(cut.ends_with("IMG_0001.jpg"));
    }

    #[test]
    fn test_truncate_path_counts_chars_not_bytes() {
        let path = "/ünïcödé/ファイル名前.txt";
        let cut = truncate_path(path, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("前.txt"));
    }
}
