//! The engine: owns the index store and exposes indexing and query entry points.
//!
//! Only the indexing pipeline writes to the store, and it does so after each
//! batch of files has been analysed. A write gate serializes full runs and
//! incremental updates against each other; queries take read guards.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::ranker::{RankingStrategy, RelevanceReason};
use crate::context::{
    ContextAssembler, ContextRequest, ContextSelection, QueryTerms, RelevanceRanker,
};
use crate::embedder::SemanticSearch;
use crate::error::{EngineError, FileIndexError, Result};
use crate::events::{EVENT_CHANNEL_CAPACITY, IndexEvent, IndexProgress, IndexSummary};
use crate::indexer::{Indexer, relative_path};
use crate::store::IndexStore;
use crate::store::graph::GraphMetrics;
use crate::store::models::{FileRecord, IndexStatusReport, SymbolLocation};
use crate::store::search::SearchOptions;

/// Optional per-file progress hook for [`ContextEngine::index_workspace`].
pub type ProgressCallback<'a> = &'a (dyn Fn(IndexProgress) + Send + Sync);

/// A ranked file without its content.
#[derive(Debug, Clone, Serialize)]
pub struct RankedFile {
    pub path: String,
    pub language: String,
    pub score: f64,
    pub reasons: Vec<RelevanceReason>,
    pub strategy: RankingStrategy,
}

pub struct ContextEngine {
    config: Arc<Config>,
    indexer: Indexer,
    store: Arc<RwLock<IndexStore>>,
    write_gate: Mutex<()>,
    events: broadcast::Sender<IndexEvent>,
    semantic: Option<SemanticSearch>,
}

impl ContextEngine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let indexer = Indexer::new(config.clone())?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            indexer,
            store: Arc::new(RwLock::new(IndexStore::new())),
            write_gate: Mutex::new(()),
            events,
            semantic: None,
        })
    }

    /// Enables the semantic ranking strategy.
    pub fn with_semantic_search(mut self, semantic: SemanticSearch) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiver for lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Read access to the store, for callers that need a consistent snapshot
    /// across several queries.
    pub fn store(&self) -> Arc<RwLock<IndexStore>> {
        self.store.clone()
    }

    pub async fn root(&self) -> Option<PathBuf> {
        self.store.read().await.root().map(Path::to_path_buf)
    }

    fn emit(&self, event: IndexEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ── Indexing ─────────────────────────────────────────────────────

    /// Indexes every eligible file under `root`, replacing the previous index.
    ///
    /// Per-file failures are logged and reported as [`IndexEvent::Error`];
    /// only an inaccessible root fails the call.
    pub async fn index_workspace(
        &self,
        root: impl AsRef<Path>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<IndexSummary> {
        let _gate = self.write_gate.lock().await;
        let started = Instant::now();
        let requested = root.as_ref().to_path_buf();

        let discovered = std::fs::canonicalize(&requested)
            .map_err(|source| EngineError::WorkspaceAccess {
                path: requested.clone(),
                source,
            })
            .and_then(|root| {
                let files = self.indexer.discover(&root)?;
                Ok((root, files))
            });
        let (root, files) = match discovered {
            Ok(found) => found,
            Err(e) => {
                warn!("Indexing failed: {e}");
                self.store.write().await.mark_failed(e.to_string());
                self.emit(IndexEvent::Error {
                    path: None,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let total = files.len();
        self.store.write().await.begin_run(root.clone(), total);
        self.emit(IndexEvent::Started {
            root: root.clone(),
            total_files: total,
        });

        let mut summary = IndexSummary {
            total_files: total,
            ..IndexSummary::default()
        };
        let mut processed = 0;
        let batch_size = self.config.batch_size.max(1);
        let pause = Duration::from_millis(self.config.batch_pause_ms);
        let batch_count = total.div_ceil(batch_size);

        for (batch_no, batch) in files.chunks(batch_size).enumerate() {
            let mut results = self.indexer.index_batch(&root, batch).await;
            results.sort_by(|a, b| a.0.cmp(&b.0));

            let mut finished = Vec::with_capacity(results.len());
            {
                let mut store = self.store.write().await;
                for (path, result) in results {
                    processed += 1;
                    let rel_display = relative_path(&root, &path)
                        .unwrap_or_else(|| path.display().to_string());
                    match result {
                        Ok(record) => {
                            summary.indexed += 1;
                            let symbols = record.symbols.len();
                            store.upsert(record);
                            self.emit(IndexEvent::FileIndexed {
                                path: rel_display.clone(),
                                indexed: summary.indexed,
                                total,
                                symbols,
                            });
                        }
                        Err(FileIndexError::TooLarge { size, limit }) => {
                            summary.skipped += 1;
                            debug!("Skipping {rel_display}: {size} bytes > {limit}");
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!("Failed to index {rel_display}: {e}");
                            self.emit(IndexEvent::Error {
                                path: Some(rel_display.clone()),
                                message: e.to_string(),
                            });
                        }
                    }
                    finished.push(IndexProgress {
                        processed,
                        total,
                        path: rel_display,
                    });
                }
            }

            if let Some(callback) = progress {
                for update in finished {
                    callback(update);
                }
            }
            if batch_no + 1 < batch_count && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        {
            let mut store = self.store.write().await;
            store.rebuild_graph();
            store.mark_ready();
            summary.symbols = store.symbol_count();
            summary.dependency_edges = store.graph().edge_count();
        }
        summary.elapsed = started.elapsed();

        info!(
            "Indexed {}/{} files ({} skipped, {} failed), {} symbols, {} edges in {:?}",
            summary.indexed,
            summary.total_files,
            summary.skipped,
            summary.failed,
            summary.symbols,
            summary.dependency_edges,
            summary.elapsed
        );
        self.emit(IndexEvent::Completed(summary.clone()));
        Ok(summary)
    }

    /// Re-indexes one file and rebuilds the dependency graph.
    ///
    /// The file's previous symbol entries are always dropped. A file that no
    /// longer exists or no longer qualifies is removed from the index;
    /// analysis failures remove it too and are returned as
    /// [`EngineError::FileIndexing`].
    pub async fn update_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let root = self.root().await.ok_or(EngineError::NoWorkspace)?;
        let absolute = normalize_path(&root, path.as_ref());
        let relative = relative_path(&root, &absolute)
            .ok_or_else(|| EngineError::OutsideWorkspace(absolute.clone()))?;

        if !absolute.is_file() {
            let mut store = self.store.write().await;
            if store.remove(&relative).is_some() {
                debug!("Removed vanished file {relative}");
            }
            return Ok(());
        }

        let result = self.indexer.index_file(&root, &absolute).await;

        let mut store = self.store.write().await;
        match result {
            Ok(record) => {
                let symbols = record.symbols.len();
                store.upsert(record);
                store.rebuild_graph();
                let indexed = store.file_count();
                drop(store);
                debug!("Updated {relative}");
                self.emit(IndexEvent::FileIndexed {
                    path: relative,
                    indexed,
                    total: indexed,
                    symbols,
                });
                Ok(())
            }
            Err(
                FileIndexError::TooLarge { .. }
                | FileIndexError::Unsupported(_)
                | FileIndexError::Ignored,
            ) => {
                if store.remove(&relative).is_some() {
                    store.rebuild_graph();
                }
                debug!("{relative} is no longer indexable");
                Ok(())
            }
            Err(source) => {
                if store.remove(&relative).is_some() {
                    store.rebuild_graph();
                }
                drop(store);
                warn!("Failed to update {relative}: {source}");
                self.emit(IndexEvent::Error {
                    path: Some(relative.clone()),
                    message: source.to_string(),
                });
                Err(EngineError::FileIndexing {
                    path: relative,
                    source,
                })
            }
        }
    }

    /// Drops a file's record and symbol entries, and prunes it from the graph.
    ///
    /// Returns whether the file was indexed.
    pub async fn remove_file(&self, path: impl AsRef<Path>) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        let root = self.root().await.ok_or(EngineError::NoWorkspace)?;
        let absolute = normalize_path(&root, path.as_ref());
        let relative = relative_path(&root, &absolute)
            .ok_or_else(|| EngineError::OutsideWorkspace(absolute.clone()))?;

        let removed = self.store.write().await.remove(&relative).is_some();
        if removed {
            debug!("Removed {relative}");
        }
        Ok(removed)
    }

    /// Rebuilds the dependency graph from the current records.
    pub async fn build_global_index(&self) {
        let _gate = self.write_gate.lock().await;
        self.store.write().await.rebuild_graph();
    }

    /// Whether the watcher should forward changes for `path`.
    pub async fn accepts_path(&self, path: &Path) -> bool {
        let Some(root) = self.root().await else {
            return false;
        };
        let absolute = normalize_path(&root, path);
        self.indexer.check_candidate(&root, &absolute).is_ok()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Definition sites of `name`.
    pub async fn find_symbol(&self, name: &str) -> Vec<SymbolLocation> {
        self.store.read().await.find_symbol(name)
    }

    /// Import sites of `name`.
    pub async fn find_references(&self, name: &str) -> Vec<SymbolLocation> {
        self.store.read().await.find_references(name)
    }

    pub async fn search_files(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<FileRecord>> {
        let store = self.store.read().await;
        Ok(store
            .search_files(query, options)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn get_related_files(&self, path: &str, max_results: usize) -> Vec<FileRecord> {
        let store = self.store.read().await;
        let key = index_key(&store, path);
        store
            .related_files(&key, max_results)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ranked candidates for `request`, best first.
    pub async fn find_relevant_files(&self, request: &ContextRequest) -> Vec<RankedFile> {
        let store = self.store.read().await;
        let terms = QueryTerms::new(request, &store);
        let current = request
            .current_file
            .as_deref()
            .map(|p| index_key(&store, p));

        RelevanceRanker::new(&store, &self.config.context)
            .with_semantic(self.semantic.as_ref())
            .rank(&terms, current.as_deref())
            .into_iter()
            .map(|c| RankedFile {
                path: c.file.path.clone(),
                language: c.file.language.clone(),
                score: c.score,
                reasons: c.reasons.into_iter().collect(),
                strategy: c.strategy,
            })
            .collect()
    }

    /// Budgeted context for `request`.
    ///
    /// An empty selection is a valid answer, e.g. before anything is indexed.
    pub async fn build_context(&self, request: &ContextRequest) -> ContextSelection {
        let store = self.store.read().await;
        let terms = QueryTerms::new(request, &store);
        let current_key = request
            .current_file
            .as_deref()
            .map(|p| index_key(&store, p));
        let current = current_key.as_deref().and_then(|k| store.get(k));
        if current_key.is_some() && current.is_none() {
            debug!("Current file {current_key:?} is not indexed");
        }

        let candidates = RelevanceRanker::new(&store, &self.config.context)
            .with_semantic(self.semantic.as_ref())
            .rank(&terms, current_key.as_deref());
        let max_tokens = request.max_tokens.unwrap_or(self.config.context.max_tokens);

        ContextAssembler::new(&self.config.context).select(&terms, current, &candidates, max_tokens)
    }

    pub async fn get_index_status(&self) -> IndexStatusReport {
        self.store.read().await.status_report()
    }

    pub async fn graph_metrics(&self, top: usize) -> GraphMetrics {
        self.store.read().await.graph().metrics(top)
    }
}

/// Absolute form of `path`, resolving relative paths against `root` and
/// symlinks where the file (or its parent) still exists.
fn normalize_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    if let Ok(canonical) = std::fs::canonicalize(&joined) {
        return canonical;
    }
    match (joined.parent(), joined.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or(joined),
        _ => joined,
    }
}

/// Store key for a user-supplied path, relative or absolute.
fn index_key(store: &IndexStore, path: &str) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        if let Some(root) = store.root() {
            let absolute = normalize_path(root, candidate);
            if let Some(relative) = relative_path(root, &absolute) {
                return relative;
            }
        }
    }
    path.replace('\\', "/").trim_start_matches("./").to_string()
}
