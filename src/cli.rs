//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use backup_core::config::{
    BackupConfig, ENV_ACCESS_TOKEN, ENV_BACKUP_DEST, ENV_CONCURRENT_DOWNLOADS,
    ENV_MAX_GB_PER_RUN, ENV_MAX_RETRIES, ENV_ROOT_PATH, ENV_TIMEOUT,
};
use backup_core::scan::{FilterOptions, parse_extensions, parse_size};
use backup_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, MAX_CHUNK_SIZE};

/// Back up a Dropbox folder to local disk.
///
/// Files already present locally with the same size are skipped, so an
/// interrupted backup resumes where it stopped when run again.
#[derive(Parser, Debug)]
#[command(name = "dropbox-backup")]
#[command(author, version, about)]
pub struct Args {
    /// Local directory to mirror the Dropbox tree into
    #[arg(long, env = ENV_BACKUP_DEST)]
    pub dest: Option<PathBuf>,

    /// Dropbox folder to back up (empty for the whole account)
    #[arg(long, env = ENV_ROOT_PATH, default_value = "")]
    pub root: String,

    /// Dropbox access token
    #[arg(long, env = ENV_ACCESS_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum concurrent downloads (1-20)
    #[arg(short = 'c', long, env = ENV_CONCURRENT_DOWNLOADS, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub concurrency: u8,

    /// Maximum attempts per file (1-10)
    #[arg(short = 'r', long, env = ENV_MAX_RETRIES, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: u8,

    /// Stop starting new downloads after this many GB in one run (0 = unlimited)
    #[arg(long, env = ENV_MAX_GB_PER_RUN, default_value_t = 0.0)]
    pub max_gb: f64,

    /// Starting (and minimum) delay between requests in milliseconds
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=60_000))]
    pub min_delay_ms: u64,

    /// Read timeout per download in seconds (at least 30)
    #[arg(long, env = ENV_TIMEOUT, default_value_t = 300)]
    pub timeout: u64,

    /// Write buffer size per download, up to 64MB (e.g. 512KB, 1MB)
    #[arg(long, default_value = "1MB", value_parser = parse_chunk_size_arg)]
    pub chunk_size: u64,

    /// Only download these extensions (comma-separated, e.g. "jpg,png")
    #[arg(long)]
    pub include_ext: Option<String>,

    /// Never download these extensions (comma-separated)
    #[arg(long)]
    pub exclude_ext: Option<String>,

    /// Skip files smaller than this (e.g. 10KB)
    #[arg(long, value_parser = parse_size_arg)]
    pub min_size: Option<u64>,

    /// Skip files larger than this (e.g. 2GB)
    #[arg(long, value_parser = parse_size_arg)]
    pub max_size: Option<u64>,

    /// Also download dependency/build folders (node_modules, target, ...)
    #[arg(long)]
    pub include_deps: bool,

    /// Scan and count without downloading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable colored output and the live progress block
    #[arg(long)]
    pub no_color: bool,

    /// Log file used while the live progress block is shown
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the Dropbox API base URL
    #[arg(long, env = "DROPBOX_API_URL", hide = true)]
    pub api_url: Option<String>,

    /// Override the Dropbox content base URL
    #[arg(long, env = "DROPBOX_CONTENT_URL", hide = true)]
    pub content_url: Option<String>,
}

fn parse_size_arg(value: &str) -> Result<u64, String> {
    parse_size(value).map_err(|e| e.to_string())
}

fn parse_chunk_size_arg(value: &str) -> Result<u64, String> {
    let size = parse_size_arg(value)?;
    if size == 0 || size > MAX_CHUNK_SIZE as u64 {
        return Err(format!("chunk size must be between 1B and 64MB, got {value}"));
    }
    Ok(size)
}

impl Args {
    /// Run configuration from the parsed flags.
    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            access_token: self.token.clone().unwrap_or_default().trim().to_string(),
            root_path: self.root.clone(),
            dest_root: self.dest.clone().unwrap_or_default(),
            max_gb_per_run: self.max_gb,
            max_concurrent_downloads: usize::from(self.concurrency),
            min_download_delay: Duration::from_millis(self.min_delay_ms),
            download_timeout_secs: self.timeout,
            chunk_size: usize::try_from(self.chunk_size).unwrap_or(usize::MAX),
            max_retries: u32::from(self.max_retries),
            ..BackupConfig::default()
        }
    }

    /// Filter options from the parsed flags.
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            skip_dependencies: !self.include_deps,
            include_extensions: self
                .include_ext
                .as_deref()
                .map(parse_extensions)
                .unwrap_or_default(),
            exclude_extensions: self
                .exclude_ext
                .as_deref()
                .map(parse_extensions)
                .unwrap_or_default(),
            min_size_bytes: self.min_size.unwrap_or(0),
            max_size_bytes: self.max_size.unwrap_or(0),
            dry_run: self.dry_run,
        }
    }

    /// Default log level: `-q` → error, `-v` → debug, `-vv` → trace.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["dropbox-backup"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let args = parse(&["--dest", "/tmp/b", "--token", "t"]);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.max_retries, 5);
        assert_eq!(args.chunk_size, 1024 * 1024);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        assert_eq!(parse(&["-v"]).verbose, 1);
        assert_eq!(parse(&["-vv"]).verbose, 2);
        assert_eq!(parse(&["-vv"]).default_log_level(), "trace");
        assert_eq!(parse(&["-q"]).default_log_level(), "error");
        assert_eq!(parse(&[]).default_log_level(), "info");
    }

    #[test]
    fn test_cli_concurrency_range() {
        assert_eq!(parse(&["-c", "20"]).concurrency, 20);
        assert!(Args::try_parse_from(["dropbox-backup", "-c", "0"]).is_err());
        assert!(Args::try_parse_from(["dropbox-backup", "-c", "21"]).is_err());
        assert!(Args::try_parse_from(["dropbox-backup", "-r", "11"]).is_err());
    }

    #[test]
    fn test_cli_sizes_are_human() {
        let args = parse(&["--min-size", "10KB", "--max-size", "1.5MB", "--chunk-size", "256k"]);
        assert_eq!(args.min_size, Some(10 * 1024));
        assert_eq!(args.max_size, Some(1_572_864));
        assert_eq!(args.chunk_size, 256 * 1024);
        assert!(Args::try_parse_from(["dropbox-backup", "--min-size", "lots"]).is_err());
    }

    #[test]
    fn test_cli_rejects_zero_delay_and_oversized_chunks() {
        assert_eq!(parse(&["--min-delay-ms", "1"]).min_delay_ms, 1);
        assert!(Args::try_parse_from(["dropbox-backup", "--min-delay-ms", "0"]).is_err());

        assert_eq!(parse(&["--chunk-size", "64MB"]).chunk_size, 64 * 1024 * 1024);
        assert!(Args::try_parse_from(["dropbox-backup", "--chunk-size", "65MB"]).is_err());
        assert!(Args::try_parse_from(["dropbox-backup", "--chunk-size", "0"]).is_err());
    }

    #[test]
    fn test_cli_maps_to_config_and_filters() {
        let args = parse(&[
            "--dest",
            "/tmp/b",
            "--token",
            " tok ",
            "--root",
            "/Photos",
            "-c",
            "3",
            "--max-gb",
            "2",
            "--include-ext",
            "JPG,.png",
            "--include-deps",
            "--dry-run",
        ]);
        let config = args.backup_config();
        assert_eq!(config.access_token, "tok");
        assert_eq!(config.root_path, "/Photos");
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_bytes_per_run(), 2_000_000_000);

        let filters = args.filter_options();
        assert!(!filters.skip_dependencies);
        assert!(filters.dry_run);
        assert!(filters.include_extensions.contains("jpg"));
        assert!(filters.include_extensions.contains("png"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["dropbox-backup", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
