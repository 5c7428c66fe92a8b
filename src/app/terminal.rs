//! Terminal capability checks and tracing setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::cli::Args;

/// Default log file used while the live progress block owns the terminal.
pub(crate) const DEFAULT_LOG_FILE: &str = "dropbox_backup.log";

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

/// Whether colour, cursor control and the live progress block are used.
pub(crate) fn should_use_live_display(
    stdout_is_terminal: bool,
    quiet: bool,
    no_color_flag: bool,
    no_color_env: bool,
    dumb_terminal: bool,
) -> bool {
    stdout_is_terminal && !quiet && !no_color_flag && !no_color_env && !dumb_terminal
}

pub(crate) fn is_live_display(args: &Args, stdout_is_terminal: bool) -> bool {
    should_use_live_display(
        stdout_is_terminal,
        args.quiet,
        args.no_color,
        no_color_env_requested(),
        is_dumb_terminal(),
    )
}

/// Installs the global subscriber.
///
/// With the live display on, log lines would tear the progress block, so they
/// go to `log_file` without ANSI codes. Otherwise they go to stderr.
/// `RUST_LOG` always wins over `default_level`.
pub(crate) fn init_tracing(default_level: &str, live: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if live {
        let path = log_file.unwrap_or_else(|| Path::new(DEFAULT_LOG_FILE));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init();
    }
    Ok(())
}
