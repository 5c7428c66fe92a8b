//! Run configuration.
//!
//! [`BackupConfig`] carries every tunable the scanner, engine and limiter
//! consume. Values come from built-in defaults, then a `.env` file, then the
//! process environment, then command-line flags.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::download::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    DEFAULT_MIN_DELAY, DEFAULT_RATE_LIMIT_THRESHOLD, DEFAULT_RATE_LIMIT_WINDOW, MAX_CHUNK_SIZE,
    MAX_CONCURRENCY, MIN_CONCURRENCY, MIN_REQUEST_DELAY,
};
use crate::download::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_MAX, EngineConfig, RateLimiter,
    RetryPolicy,
};
use crate::scan::default_skip_dirs;

/// Environment variable holding the access token.
pub const ENV_ACCESS_TOKEN: &str = "DROPBOX_ACCESS_TOKEN";
/// Environment variable holding the remote root folder.
pub const ENV_ROOT_PATH: &str = "DROPBOX_ROOT_PATH";
/// Environment variable holding the local destination.
pub const ENV_BACKUP_DEST: &str = "DROPBOX_BACKUP_DEST";
/// Environment variable holding the per-run cap in GB.
pub const ENV_MAX_GB_PER_RUN: &str = "DROPBOX_MAX_GB_PER_RUN";
/// Environment variable holding the worker pool size.
pub const ENV_CONCURRENT_DOWNLOADS: &str = "DROPBOX_CONCURRENT_DOWNLOADS";
/// Environment variable holding the read timeout in seconds.
pub const ENV_TIMEOUT: &str = "DROPBOX_TIMEOUT";
/// Environment variable holding the attempts per file.
pub const ENV_MAX_RETRIES: &str = "DROPBOX_MAX_RETRIES";

/// Default read timeout for downloads, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Smallest accepted read timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 30;

/// Everything a backup run is configured by.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    /// OAuth access token.
    pub access_token: String,
    /// Remote folder to back up (empty = whole account).
    pub root_path: String,
    /// Local directory the remote tree is mirrored into.
    pub dest_root: PathBuf,
    /// Per-run cap in (decimal) gigabytes; 0 = unlimited.
    pub max_gb_per_run: f64,
    /// Worker pool size.
    pub max_concurrent_downloads: usize,
    /// Starting and minimum delay between requests.
    pub min_download_delay: Duration,
    /// Read timeout for one download, in seconds.
    pub download_timeout_secs: u64,
    /// Write buffer size per download.
    pub chunk_size: usize,
    /// Backoff ceiling for the first retry.
    pub backoff_base: Duration,
    /// Upper bound for any backoff.
    pub backoff_max: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_factor: f64,
    /// Attempts per file, including the first.
    pub max_retries: u32,
    /// Window used to detect bursts of rate limiting.
    pub rate_limit_window: Duration,
    /// Rate-limit hits within the window that count as a burst.
    pub rate_limit_threshold: usize,
    /// Ceiling for the adaptive request delay.
    pub rate_limit_max_delay: Duration,
    /// Lower-cased folder names treated as dependency folders.
    pub skip_dir_names: HashSet<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            root_path: String::new(),
            dest_root: PathBuf::new(),
            max_gb_per_run: 0.0,
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
            min_download_delay: DEFAULT_MIN_DELAY,
            download_timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            rate_limit_threshold: DEFAULT_RATE_LIMIT_THRESHOLD,
            rate_limit_max_delay: DEFAULT_MAX_DELAY,
            skip_dir_names: default_skip_dirs(),
        }
    }
}

impl BackupConfig {
    /// Returns every configuration problem at once; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.access_token.is_empty() {
            errors.push(format!("{ENV_ACCESS_TOKEN} is required"));
        } else if self.access_token.contains("PASTE") {
            errors.push(format!("{ENV_ACCESS_TOKEN} contains placeholder text"));
        }

        if self.dest_root.as_os_str().is_empty() {
            errors.push("Destination directory is required".to_string());
        } else if self.dest_root.exists() && !self.dest_root.is_dir() {
            errors.push(format!(
                "Destination exists but is not a directory: {}",
                self.dest_root.display()
            ));
        }

        if self.max_concurrent_downloads < MIN_CONCURRENCY {
            errors.push(format!(
                "max_concurrent_downloads must be at least {MIN_CONCURRENCY}"
            ));
        } else if self.max_concurrent_downloads > MAX_CONCURRENCY {
            errors.push(format!(
                "max_concurrent_downloads should not exceed {MAX_CONCURRENCY}"
            ));
        }

        if self.download_timeout_secs < MIN_TIMEOUT_SECS {
            errors.push(format!(
                "download_timeout should be at least {MIN_TIMEOUT_SECS} seconds"
            ));
        }

        if self.min_download_delay < MIN_REQUEST_DELAY {
            errors.push("min_download_delay must be at least 1 ms".to_string());
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            errors.push(format!(
                "chunk_size must be between 1 byte and {} MiB",
                MAX_CHUNK_SIZE / (1024 * 1024)
            ));
        }

        if !self.max_gb_per_run.is_finite() || self.max_gb_per_run < 0.0 {
            errors.push("max_gb_per_run must be zero or positive".to_string());
        }

        errors
    }

    /// The per-run byte cap (`max_gb_per_run × 10⁹`), 0 when unlimited.
    #[must_use]
    pub fn max_bytes_per_run(&self) -> u64 {
        if self.max_gb_per_run > 0.0 && self.max_gb_per_run.is_finite() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bytes = (self.max_gb_per_run * 1e9) as u64;
            bytes
        } else {
            0
        }
    }

    /// Retry policy from the backoff settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.backoff_base,
            self.backoff_max,
            self.backoff_factor,
        )
    }

    /// A fresh adaptive limiter from the rate-limit settings.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::with_settings(
            self.min_download_delay,
            self.rate_limit_max_delay,
            self.rate_limit_window,
            self.rate_limit_threshold,
        )
    }

    /// Engine settings; `dry_run` comes from the filter options.
    #[must_use]
    pub fn engine_config(&self, dry_run: bool) -> EngineConfig {
        EngineConfig {
            max_concurrent_downloads: self.max_concurrent_downloads,
            download_chunk_size: self.chunk_size,
            retry_policy: self.retry_policy(),
            max_bytes_per_run: self.max_bytes_per_run(),
            dry_run,
            dest_root: self.dest_root.clone(),
        }
    }

    /// Creates the destination directory if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn ensure_dest_exists(&self) -> std::io::Result<&Path> {
        std::fs::create_dir_all(&self.dest_root)?;
        Ok(&self.dest_root)
    }
}

/// Loads `.env` from the working directory without overriding variables that
/// are already set. A missing file is not an error.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => debug!(error = %e, "ignoring unreadable .env"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> BackupConfig {
        BackupConfig {
            access_token: "sl.real-token".to_string(),
            dest_root: std::env::temp_dir(),
            ..BackupConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let c = BackupConfig::default();
        assert_eq!(c.max_concurrent_downloads, 6);
        assert_eq!(c.min_download_delay, Duration::from_millis(50));
        assert_eq!(c.download_timeout_secs, 300);
        assert_eq!(c.chunk_size, 1024 * 1024);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.backoff_max, Duration::from_secs(60));
        assert_eq!(c.rate_limit_threshold, 3);
        assert!(c.skip_dir_names.contains("node_modules"));
        assert!(c.skip_dir_names.contains("pods"));
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        assert!(valid().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let c = BackupConfig {
            max_concurrent_downloads: 0,
            download_timeout_secs: 5,
            ..BackupConfig::default()
        };
        let errors = c.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("required")));
        assert!(errors.iter().any(|e| e.contains("Destination")));
        assert!(errors.iter().any(|e| e.contains("at least 1")));
        assert!(errors.iter().any(|e| e.contains("30 seconds")));
    }

    #[test]
    fn test_validate_placeholder_token_and_high_concurrency() {
        let c = BackupConfig {
            access_token: "PASTE_YOUR_TOKEN_HERE".to_string(),
            max_concurrent_downloads: 21,
            ..valid()
        };
        let errors = c.validate();
        assert!(errors.iter().any(|e| e.contains("placeholder")));
        assert!(errors.iter().any(|e| e.contains("exceed 20")));
    }

    #[test]
    fn test_validate_rejects_zero_delay_and_oversized_chunks() {
        let c = BackupConfig {
            min_download_delay: Duration::ZERO,
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..valid()
        };
        let errors = c.validate();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("1 ms")));
        assert!(errors.iter().any(|e| e.contains("64 MiB")));

        let edge = BackupConfig {
            min_download_delay: MIN_REQUEST_DELAY,
            chunk_size: MAX_CHUNK_SIZE,
            ..valid()
        };
        assert!(edge.validate().is_empty());
    }

    #[test]
    fn test_validate_dest_is_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let c = BackupConfig {
            dest_root: file.path().to_path_buf(),
            ..valid()
        };
        assert!(c.validate().iter().any(|e| e.contains("not a directory")));
    }

    #[test]
    fn test_max_bytes_per_run() {
        let mut c = BackupConfig::default();
        assert_eq!(c.max_bytes_per_run(), 0);
        c.max_gb_per_run = 2.5;
        assert_eq!(c.max_bytes_per_run(), 2_500_000_000);
    }

    #[test]
    fn test_engine_config_mirrors_settings() {
        let c = BackupConfig {
            max_retries: 3,
            max_gb_per_run: 1.0,
            ..valid()
        };
        let engine = c.engine_config(true);
        assert!(engine.dry_run);
        assert_eq!(engine.max_bytes_per_run, 1_000_000_000);
        assert_eq!(engine.retry_policy.max_attempts(), 3);
        assert_eq!(engine.dest_root, c.dest_root);
        assert_eq!(c.rate_limiter().min_delay(), Duration::from_millis(50));
    }
}
