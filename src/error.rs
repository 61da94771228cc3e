use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a download or reshape how it runs.
///
/// Per-segment transport failures are not represented here: they are
/// recorded as [`crate::report::SegmentOutcome::Failed`] values and
/// aggregated at the join point instead of crossing task boundaries as
/// errors.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The server answered the size query without a usable Content-Length.
    /// Recovered inside the coordinator by the streaming fallback path.
    #[error("no content length reported for {0}")]
    SizeUnknown(String),

    /// More connections requested than there are bytes to split. Recovered
    /// by clamping the connection count and replanning once.
    #[error("cannot split {total} bytes across {connections} connections")]
    InvalidPartition { total: u64, connections: usize },

    /// The size query could not reach the server at all.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The destination file could not be opened, sized, or written. Fatal
    /// for the whole download: no segment can proceed safely.
    #[error("filesystem error on {path:?}: {source}")]
    Filesystem { path: PathBuf, source: io::Error },

    /// A segment worker panicked.
    #[error("download worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DownloadError {
    pub(crate) fn filesystem(path: &Path, source: io::Error) -> Self {
        DownloadError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}
