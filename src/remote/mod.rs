//! Remote storage client abstraction.
//!
//! The download engine and scanner talk to the remote only through the
//! [`RemoteSource`] trait: page through a directory tree, and stream the bytes
//! of one file. [`DropboxClient`] is the production implementation.
//!
//! # Example
//!
//! ```no_run
//! use backup_core::remote::{DropboxClient, RemoteSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DropboxClient::new("sl.token", 300)?;
//! let page = client.list_folder("/Photos", true).await?;
//! for entry in &page.entries {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//! }
//! # Ok(())
//! # }
//! ```

mod dropbox;
mod error;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

pub use dropbox::{DropboxClient, parse_retry_after};
pub use error::RemoteError;

/// A file reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Display path on the remote, with a leading `/`.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

impl FileDescriptor {
    /// Creates a descriptor.
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// One page of a (possibly recursive) folder listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Files on this page. Folders are never included.
    pub entries: Vec<FileDescriptor>,
    /// Cursor for [`RemoteSource::list_folder_continue`].
    pub cursor: Option<String>,
    /// Whether another page follows.
    pub has_more: bool,
}

/// Stream of body chunks for one file download.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

/// Remote file tree the backup reads from.
///
/// Implementations must be shareable across worker tasks.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Lists the folder at `root` (empty string for the whole account).
    async fn list_folder(&self, root: &str, recursive: bool) -> Result<ListPage, RemoteError>;

    /// Fetches the page following `cursor`.
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, RemoteError>;

    /// Opens a streamed download of the file at `path`.
    async fn stream_download(&self, path: &str) -> Result<ByteStream, RemoteError>;
}
