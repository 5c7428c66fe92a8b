//! Remote tree scanning.
//!
//! This module walks the remote listing page by page and applies the filter
//! predicate, producing the flat list of files the download engine consumes.
//!
//! # Example
//!
//! ```no_run
//! use backup_core::remote::DropboxClient;
//! use backup_core::scan::{FilterOptions, default_skip_dirs, scan};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DropboxClient::new("sl.token", 300)?;
//! let result = scan(&client, "/Photos", &FilterOptions::default(), &default_skip_dirs()).await?;
//! println!("{} files to download", result.files.len());
//! # Ok(())
//! # }
//! ```

mod filter;

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

pub use filter::{
    DEFAULT_SKIP_DIRS, FilterOptions, ParseSizeError, SkipReason, default_skip_dirs,
    normalize_remote_path, parse_extensions, parse_size, should_skip,
};

use crate::remote::{FileDescriptor, ListPage, RemoteError, RemoteSource};

/// Totals gathered while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files seen in the listing.
    pub scanned: u64,
    /// Files inside dependency/build folders.
    pub skipped_dependency: u64,
    /// Files excluded by extension or size.
    pub skipped_filter: u64,
    /// Total size of the kept files.
    pub bytes_to_download: u64,
}

impl ScanSummary {
    /// Files kept so far: scanned minus both kinds of skip.
    #[must_use]
    pub fn files_to_download(&self) -> u64 {
        self.scanned
            .saturating_sub(self.skipped_dependency)
            .saturating_sub(self.skipped_filter)
    }
}

/// Files kept by a scan plus its totals.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Files to hand to the download engine.
    pub files: Vec<FileDescriptor>,
    /// Scan totals.
    pub summary: ScanSummary,
    /// Set when a continuation page failed and the listing is incomplete.
    pub truncated: bool,
}

/// Restartable, finite sequence of listing pages.
pub struct Listing<'a> {
    source: &'a dyn RemoteSource,
    root: String,
    state: ListingState,
}

enum ListingState {
    Start,
    Continue(String),
    Done,
}

impl<'a> Listing<'a> {
    /// Creates a recursive listing of `root` (normalised first).
    #[must_use]
    pub fn new(source: &'a dyn RemoteSource, root: &str) -> Self {
        Self {
            source,
            root: normalize_remote_path(root),
            state: ListingState::Start,
        }
    }

    /// Fetches the next page, or `Ok(None)` once the listing is exhausted.
    ///
    /// After an error the listing stays where it was, so the same page can
    /// be requested again.
    ///
    /// # Errors
    ///
    /// Returns the remote error for the failed page.
    pub async fn next_page(&mut self) -> Result<Option<ListPage>, RemoteError> {
        let page = match &self.state {
            ListingState::Done => return Ok(None),
            ListingState::Start => self.source.list_folder(&self.root, true).await?,
            ListingState::Continue(cursor) => self.source.list_folder_continue(cursor).await?,
        };

        self.state = match (&page.cursor, page.has_more) {
            (Some(cursor), true) => ListingState::Continue(cursor.clone()),
            (None, true) => {
                warn!("listing reported more pages without a cursor");
                ListingState::Done
            }
            (_, false) => ListingState::Done,
        };

        Ok(Some(page))
    }

    /// Rewinds to the first page.
    pub fn restart(&mut self) {
        self.state = ListingState::Start;
    }
}

/// Scans `root` and keeps the files that pass `filters`.
///
/// # Errors
///
/// Returns the remote error if the first page cannot be listed. A failure on
/// a later page ends the scan early with [`ScanResult::truncated`] set.
pub async fn scan(
    source: &dyn RemoteSource,
    root: &str,
    filters: &FilterOptions,
    skip_dirs: &HashSet<String>,
) -> Result<ScanResult, RemoteError> {
    scan_with_progress(source, root, filters, skip_dirs, |_| {}).await
}

/// Like [`scan`], calling `on_page` with the running totals after every page.
///
/// # Errors
///
/// Returns the remote error if the first page cannot be listed.
#[instrument(skip(source, filters, skip_dirs, on_page))]
pub async fn scan_with_progress<F>(
    source: &dyn RemoteSource,
    root: &str,
    filters: &FilterOptions,
    skip_dirs: &HashSet<String>,
    mut on_page: F,
) -> Result<ScanResult, RemoteError>
where
    F: FnMut(&ScanSummary),
{
    let mut listing = Listing::new(source, root);
    let mut result = ScanResult::default();
    let mut first = true;

    loop {
        let page = match listing.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(e) if first => return Err(e),
            Err(e) => {
                warn!(error = %e, "listing failed mid-scan - continuing with files found so far");
                result.truncated = true;
                break;
            }
        };
        first = false;

        for file in page.entries {
            result.summary.scanned += 1;
            match should_skip(&file, filters, skip_dirs) {
                Some(SkipReason::Dependency) => result.summary.skipped_dependency += 1,
                Some(reason) => {
                    debug!(path = %file.path, ?reason, "filtered");
                    result.summary.skipped_filter += 1;
                }
                None => {
                    result.summary.bytes_to_download += file.size;
                    result.files.push(file);
                }
            }
        }

        on_page(&result.summary);
    }

    info!(
        scanned = result.summary.scanned,
        to_download = result.files.len(),
        bytes = result.summary.bytes_to_download,
        skipped_dependency = result.summary.skipped_dependency,
        skipped_filter = result.summary.skipped_filter,
        "scan complete"
    );

    Ok(result)
}
