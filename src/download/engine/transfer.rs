//! Streaming one remote file to a colocated partial file.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::StopSignal;
use crate::download::constants::{MAX_CHUNK_SIZE, PARTIAL_SUFFIX};
use crate::download::stats::StatsStore;
use crate::remote::{RemoteError, RemoteSource};

/// Why a single transfer attempt ended early.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TransferError {
    /// The remote failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Writing the local file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stop signal was observed mid-stream.
    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Maps a remote display path below `root`.
///
/// Empty, `.` and `..` components are dropped so the result never escapes
/// `root`.
#[must_use]
pub fn destination_for(root: &Path, remote_path: &str) -> PathBuf {
    let mut dest = root.to_path_buf();
    for part in remote_path.split(['/', '\\']) {
        let mut components = Path::new(part).components();
        if let (Some(Component::Normal(name)), None) = (components.next(), components.next()) {
            dest.push(name);
        }
    }
    dest
}

/// `<dest>.part`, next to the destination.
#[must_use]
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map_or_else(OsString::new, OsString::from);
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Streams `remote_path` into `part_path`, reporting progress for `slot`.
///
/// Returns the number of bytes written. The caller owns cleanup of
/// `part_path` on every error.
pub(crate) async fn stream_to_part(
    source: &dyn RemoteSource,
    remote_path: &str,
    part_path: &Path,
    chunk_size: usize,
    stats: &StatsStore,
    slot: u64,
    stop: &StopSignal,
) -> Result<u64, TransferError> {
    let mut stream = source.stream_download(remote_path).await?;

    let file = File::create(part_path)
        .await
        .map_err(|e| TransferError::io(part_path, e))?;
    let mut writer = BufWriter::with_capacity(chunk_size.clamp(1, MAX_CHUNK_SIZE), file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if stop.is_triggered() {
            debug!(path = %remote_path, bytes_written, "stop observed mid-stream");
            return Err(TransferError::Cancelled);
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(part_path, e))?;

        bytes_written += chunk.len() as u64;
        stats.update_download(slot, bytes_written);
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(part_path, e))?;

    Ok(bytes_written)
}

/// Removes a leftover partial file, ignoring "not found".
pub(crate) async fn discard_partial(part_path: &Path) {
    match tokio::fs::remove_file(part_path).await {
        Ok(()) => debug!(path = %part_path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %part_path.display(), error = %e, "could not remove partial file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_strips_leading_slash() {
        let dest = destination_for(Path::new("/backup"), "/Photos/2024/a.jpg");
        assert_eq!(dest, PathBuf::from("/backup/Photos/2024/a.jpg"));
    }

    #[test]
    fn test_destination_drops_traversal_components() {
        let dest = destination_for(Path::new("/backup"), "/../../etc/./passwd");
        assert_eq!(dest, PathBuf::from("/backup/etc/passwd"));

        let dest = destination_for(Path::new("/backup"), "/a\\..\\b.txt");
        assert_eq!(dest, PathBuf::from("/backup/a/b.txt"));
    }

    #[test]
    fn test_destination_of_empty_path_is_root() {
        assert_eq!(destination_for(Path::new("/backup"), "/"), PathBuf::from("/backup"));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/backup/doc.tar.gz")),
            PathBuf::from("/backup/doc.tar.gz.part")
        );
        assert_eq!(
            partial_path(Path::new("/backup/Makefile")),
            PathBuf::from("/backup/Makefile.part")
        );
    }

    #[tokio::test]
    async fn test_discard_partial_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        discard_partial(&dir.path().join("nope.part")).await;
    }
}
