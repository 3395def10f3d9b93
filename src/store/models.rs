use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Variable,
    Type,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
        }
    }
}

/// A named declaration found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-based line of the declaration.
    pub line: usize,
    /// 1-based column (in chars) where the name starts.
    pub column: usize,
    /// Bounded excerpt starting at the declaration line.
    pub excerpt: String,
    /// Workspace-relative path of the owning file.
    pub path: String,
}

/// Coarse structural tag of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Interface,
    General,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Class => "class",
            ChunkType::Interface => "interface",
            ChunkType::General => "general",
        }
    }
}

/// A contiguous run of lines. A file's chunks partition it without gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub chunk_type: ChunkType,
    pub tokens: usize,
}

/// A name brought into a file by an import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    pub line: usize,
}

/// The indexed representation of one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Workspace-relative path with `/` separators; the index key.
    pub path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub language: String,
    pub extension: String,
    pub line_count: usize,
    pub symbols: Vec<Symbol>,
    /// Import specifiers as written, deduplicated in first-seen order.
    pub imports: Vec<String>,
    pub imported_names: Vec<ImportedName>,
    pub exports: Vec<String>,
    pub chunks: Vec<SemanticChunk>,
}

impl FileRecord {
    /// Estimated tokens of the whole file (sum over its chunks).
    pub fn total_tokens(&self) -> usize {
        self.chunks.iter().map(|c| c.tokens).sum()
    }

    /// Whether `name` is declared in this file.
    pub fn defines(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }
}

/// Whether a symbol-table entry is a declaration or a use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolRole {
    Definition,
    Reference,
}

/// One entry of the global symbol multimap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub name: String,
    pub path: String,
    pub line: usize,
    pub column: usize,
    /// `None` for references.
    pub kind: Option<SymbolKind>,
    pub role: SymbolRole,
}

/// Lifecycle state of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    #[default]
    Idle,
    Indexing,
    Ready,
    Error,
}

/// Snapshot returned by `get_index_status`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusReport {
    pub status: IndexStatus,
    pub root: Option<PathBuf>,
    pub total_files: usize,
    pub indexed_files: usize,
    pub total_symbols: usize,
    pub dependency_node_count: usize,
    pub dependency_edge_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
