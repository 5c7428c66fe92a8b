//! CLI entry point for the Dropbox backup tool.

use anyhow::Result;
use clap::Parser;

mod app;
mod cli;

use cli::Args;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every file was handled (downloaded, present, or deferred by the budget).
    Success,
    /// At least one file failed.
    Failure,
    /// The configuration was rejected before any work started.
    ConfigError,
    /// The run was stopped by an interrupt.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::ConfigError => 2,
            Self::Interrupted => 130,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads env-backed flags
    backup_core::config::load_dotenv();
    let args = Args::parse();

    let exit = app::runtime::run_backup(args).await?;
    if exit != ProcessExit::Success {
        std::process::exit(exit.code());
    }
    Ok(())
}
