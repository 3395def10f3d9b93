//! File system watcher feeding incremental updates into the engine.

use crate::engine::ContextEngine;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How often pending events are checked against the debounce interval.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a settled change means for the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Update,
    Remove,
}

/// Maps a settled event to an index action. Access events are ignored.
/// The file's presence decides between update and removal, since renames
/// and quick delete/recreate sequences arrive as mixed kinds.
pub fn action_for(kind: EventKind, exists: bool) -> Option<WatchAction> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => Some(if exists {
            WatchAction::Update
        } else {
            WatchAction::Remove
        }),
        _ => None,
    }
}

/// Watches the workspace and re-indexes changed files after a quiet period.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher with debouncing.
    pub fn new(engine: Arc<ContextEngine>) -> Result<Self, notify::Error> {
        let (tx, mut rx) = mpsc::channel::<Event>(100);

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                // Called from the notify thread, outside the runtime
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => warn!("Watch error: {e}"),
            },
            Config::default(),
        )?;

        let debounce = Duration::from_millis(engine.config().watch.debounce_ms);

        tokio::spawn(async move {
            let mut pending: HashMap<PathBuf, (EventKind, Instant)> = HashMap::new();

            loop {
                tokio::select! {
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                for path in event.paths {
                                    pending.insert(path, (event.kind, Instant::now()));
                                }
                            }
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {
                        let now = Instant::now();
                        let mut settled = Vec::new();
                        pending.retain(|path, (kind, at)| {
                            if now.duration_since(*at) >= debounce {
                                settled.push((path.clone(), *kind));
                                false
                            } else {
                                true
                            }
                        });

                        settled.sort_by(|a, b| a.0.cmp(&b.0));
                        for (path, kind) in settled {
                            Self::handle_change(&engine, &path, kind).await;
                        }
                    }
                }
            }
            debug!("File watcher stopped");
        });

        Ok(Self { _watcher: watcher })
    }

    /// Start watching a directory.
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        self._watcher.watch(path, RecursiveMode::Recursive)
    }

    /// Stop watching a directory.
    pub fn unwatch(&mut self, path: &Path) -> Result<(), notify::Error> {
        self._watcher.unwatch(path)
    }

    async fn handle_change(engine: &ContextEngine, path: &Path, kind: EventKind) {
        if !engine.accepts_path(path).await {
            return;
        }
        match action_for(kind, path.is_file()) {
            Some(WatchAction::Update) => match engine.update_file(path).await {
                Ok(()) => debug!("Re-indexed: {}", path.display()),
                Err(e) => warn!("Error processing {}: {e}", path.display()),
            },
            Some(WatchAction::Remove) => match engine.remove_file(path).await {
                Ok(true) => debug!("Removed from index: {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("Error removing {}: {e}", path.display()),
            },
            None => {}
        }
    }
}
