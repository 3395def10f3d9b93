//! In-memory index store: file records, the global symbol table and the
//! dependency graph.
//!
//! The store is plain data. Concurrency is handled one level up, where the
//! engine keeps it behind a `RwLock` and lets only the indexing pipeline write.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::info;

pub mod documents;
pub mod graph;
pub mod models;
pub mod search;

use graph::DependencyGraph;
use models::{FileRecord, IndexStatus, IndexStatusReport, SymbolLocation, SymbolRole};

#[derive(Debug, Default)]
pub struct IndexStore {
    pub(crate) root: Option<PathBuf>,
    pub(crate) files: BTreeMap<String, FileRecord>,
    pub(crate) symbols: HashMap<String, Vec<SymbolLocation>>,
    pub(crate) graph: DependencyGraph,
    pub(crate) status: IndexStatus,
    /// Candidates found by the last discovery pass.
    pub(crate) total_files: usize,
    pub(crate) last_error: Option<String>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn status(&self) -> IndexStatus {
        self.status
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Starts a full run: clears the previous index and enters `indexing`.
    pub fn begin_run(&mut self, root: PathBuf, total_files: usize) {
        info!("Indexing {} ({total_files} candidate files)", root.display());
        self.files.clear();
        self.symbols.clear();
        self.graph = DependencyGraph::default();
        self.root = Some(root);
        self.total_files = total_files;
        self.last_error = None;
        self.status = IndexStatus::Indexing;
    }

    pub fn mark_ready(&mut self) {
        self.status = IndexStatus::Ready;
    }

    /// Records a failed run. The previous root and records stay in place, so
    /// incremental updates keep resolving against the last good workspace.
    pub fn mark_failed(&mut self, message: String) {
        self.last_error = Some(message);
        self.status = IndexStatus::Error;
    }

    /// Rebuilds the dependency graph from the current records.
    pub fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::build(&self.files);
    }

    /// Number of definition entries in the symbol table.
    pub fn symbol_count(&self) -> usize {
        self.symbols
            .values()
            .flatten()
            .filter(|loc| loc.role == SymbolRole::Definition)
            .count()
    }

    pub fn status_report(&self) -> IndexStatusReport {
        IndexStatusReport {
            status: self.status,
            root: self.root.clone(),
            total_files: self.total_files.max(self.files.len()),
            indexed_files: self.files.len(),
            total_symbols: self.symbol_count(),
            dependency_node_count: self.graph.node_count(),
            dependency_edge_count: self.graph.edge_count(),
            last_error: self.last_error.clone(),
        }
    }
}
