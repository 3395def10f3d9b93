/// Error types for the indexing and context-selection engine.
///
/// Only workspace-level failures reach callers of `index_workspace`; per-file
/// failures are logged and reported on the event channel instead.
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reasons a single file could not be indexed.
#[derive(Error, Debug)]
pub enum FileIndexError {
    #[error("file is {size} bytes, above the {limit} byte ceiling")]
    TooLarge { size: u64, limit: u64 },

    #[error("extension not in the include list: {0:?}")]
    Unsupported(String),

    #[error("path is excluded by ignore rules")]
    Ignored,

    #[error("file looks binary")]
    Binary,

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis task failed: {0}")]
    Task(String),
}

/// Errors surfaced by [`crate::engine::ContextEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workspace not accessible: {}: {source}", path.display())]
    WorkspaceAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to index {path}: {source}")]
    FileIndexing {
        path: String,
        #[source]
        source: FileIndexError,
    },

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("no workspace has been indexed yet")]
    NoWorkspace,

    #[error("path is outside the indexed workspace: {}", .0.display())]
    OutsideWorkspace(PathBuf),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_display() {
        let err = FileIndexError::TooLarge {
            size: 153_600,
            limit: 102_400,
        };
        assert_eq!(
            err.to_string(),
            "file is 153600 bytes, above the 102400 byte ceiling"
        );
    }

    #[test]
    fn test_workspace_access_display() {
        let err = EngineError::WorkspaceAccess {
            path: PathBuf::from("/missing/root"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/missing/root"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_file_indexing_wraps_source() {
        let err = EngineError::FileIndexing {
            path: "src/a.ts".to_string(),
            source: FileIndexError::Timeout(Duration::from_secs(5)),
        };
        assert_eq!(
            err.to_string(),
            "failed to index src/a.ts: analysis timed out after 5s"
        );
    }
}
