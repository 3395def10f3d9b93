//! Indexing lifecycle notifications.
//!
//! Events go out on a `tokio::sync::broadcast` channel; having no subscribers
//! is the normal case and sends are allowed to fail silently.
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Capacity of the event channel. Lagging receivers lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    Started {
        root: PathBuf,
        total_files: usize,
    },
    FileIndexed {
        path: String,
        indexed: usize,
        total: usize,
        symbols: usize,
    },
    Completed(IndexSummary),
    Error {
        path: Option<String>,
        message: String,
    },
}

/// Counters of a finished indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexSummary {
    pub total_files: usize,
    pub indexed: usize,
    /// Oversized files, excluded silently.
    pub skipped: usize,
    pub failed: usize,
    pub symbols: usize,
    pub dependency_edges: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Progress passed to the optional `index_workspace` callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexProgress {
    pub processed: usize,
    pub total: usize,
    pub path: String,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
