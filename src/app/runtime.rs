use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info, warn};

use backup_core::display::{
    self, Palette, ProgressRenderer, REFRESH_INTERVAL, run_header, run_summary, scan_progress,
    scan_report,
};
use backup_core::scan::scan_with_progress;
use backup_core::{DropboxClient, Engine, RemoteSource, RunReport, StatsStore, StopSignal};

use crate::ProcessExit;
use crate::app::{exit_handler, terminal};
use crate::cli::Args;

/// Runs one backup end to end: validate, scan, download, summarise.
pub(crate) async fn run_backup(args: Args) -> Result<ProcessExit> {
    let live = terminal::is_live_display(&args, io::stdout().is_terminal());
    let palette = Palette::new(live);
    terminal::init_tracing(args.default_log_level(), live, args.log_file.as_deref())?;
    debug!(?args, "CLI arguments parsed");

    let config = args.backup_config();
    let filters = args.filter_options();

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!("{}", display::header("Configuration error", palette));
        for problem in &problems {
            eprintln!("{}", display::failure(problem, palette));
        }
        return Ok(ProcessExit::ConfigError);
    }

    let dest = config
        .ensure_dest_exists()
        .with_context(|| format!("cannot create {}", config.dest_root.display()))?;
    info!(dest = %dest.display(), root = %config.root_path, "backup starting");

    let mut client = DropboxClient::new(config.access_token.clone(), config.download_timeout_secs)
        .context("failed to build HTTP client")?;
    if let (Some(api), Some(content)) = (args.api_url.as_deref(), args.content_url.as_deref()) {
        client = client
            .with_base_urls(api, content)
            .context("invalid Dropbox base URL")?;
    }
    let source: Arc<dyn RemoteSource> = Arc::new(client);

    let stop = StopSignal::new();
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        if stop_on_signal.trigger() {
            warn!(signal, "stop requested - finishing active downloads");
            // the live block shows [Stopping] itself
            if !live {
                eprintln!("\n  Gracefully stopping...");
            }
        }
    });

    let say = |text: String| {
        if !args.quiet {
            println!("{text}");
        }
    };

    say(display::header("Scanning Dropbox", palette));
    let spinner = live.then(scan_spinner);
    let scan_started = Instant::now();
    let scan = tokio::select! {
        biased;
        () = stop.wait() => None,
        result = scan_with_progress(
            source.as_ref(),
            &config.root_path,
            &filters,
            &config.skip_dir_names,
            |summary| {
                if let Some(spinner) = &spinner {
                    spinner.set_message(scan_progress(summary, scan_started.elapsed()));
                }
            },
        ) => Some(result),
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let stats = Arc::new(StatsStore::new());
    let Some(scan) = scan else {
        say(run_summary(&stats.snapshot(), true, palette));
        return Ok(ProcessExit::Interrupted);
    };
    let scan = scan.context("listing the Dropbox folder failed")?;

    say(scan_report(
        &scan.summary,
        scan.files.len(),
        scan.truncated,
        config.max_concurrent_downloads,
        palette,
    ));
    stats.record_scan(&scan.summary);

    let limiter = Arc::new(config.rate_limiter());
    let engine = Engine::new(
        config.engine_config(filters.dry_run),
        source,
        Arc::clone(&limiter),
        Arc::clone(&stats),
    )?;

    say(run_header(
        SystemTime::now(),
        engine.concurrency(),
        filters.dry_run,
        palette,
    ));

    let renderer = live.then(|| {
        ProgressRenderer::new(
            Arc::clone(&stats),
            Arc::clone(&limiter),
            engine.concurrency(),
            palette,
            ProgressDrawTarget::stdout(),
        )
        .with_stop_signal(stop.clone())
        .spawn(REFRESH_INTERVAL)
    });

    let report: RunReport = engine.run(scan.files, &stop).await;

    if let Some(renderer) = renderer {
        renderer.stop().await;
    }

    info!(
        downloaded = report.downloaded,
        failed = report.failed,
        limited = report.limited,
        cancelled = report.cancelled,
        interrupted = report.interrupted,
        "backup finished"
    );

    say(run_summary(&stats.snapshot(), report.interrupted, palette));
    if report.budget_exhausted {
        say(display::info(
            "Per-run download limit reached. Run again to continue.",
            palette,
        ));
    }

    Ok(exit_handler::determine_exit_outcome(&report))
}

fn scan_spinner() -> ProgressBar {
    let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
    spinner.set_style(
        ProgressStyle::with_template("  {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Scanning...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM; returns the signal's name.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "interrupt",
        () = terminate => "terminate",
    }
}
