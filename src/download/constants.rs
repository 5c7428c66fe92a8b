//! Defaults for the download engine, rate limiter and retry policy.

use std::time::Duration;

/// Default number of concurrent downloads.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Smallest allowed worker pool.
pub const MIN_CONCURRENCY: usize = 1;

/// Largest allowed worker pool.
pub const MAX_CONCURRENCY: usize = 20;

/// Default number of attempts per file (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default write buffer size for streamed downloads (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest accepted write buffer per download (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Default starting (and minimum) delay between requests.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(50);

/// Smallest accepted request delay; a zero floor could never grow.
pub const MIN_REQUEST_DELAY: Duration = Duration::from_millis(1);

/// Default ceiling for the adaptive request delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default window used to detect bursts of rate-limit responses.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Default number of rate-limit hits within the window that counts as a burst.
pub const DEFAULT_RATE_LIMIT_THRESHOLD: usize = 3;

/// Consecutive successes required before the limiter relaxes its delay.
pub const SUCCESSES_BEFORE_RECOVERY: u32 = 20;

/// Suffix appended to a destination path while its bytes are in flight.
pub const PARTIAL_SUFFIX: &str = ".part";
