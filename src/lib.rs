//! # codectx: source-tree indexing and context selection
//!
//! Indexes a source tree into per-file records (symbols, imports, exports,
//! semantic chunks), links files into an import dependency graph, and answers
//! "what code is relevant to this task" under a token budget. Served to AI
//! assistants via the Model Context Protocol (MCP) or used as a library.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation and ignore patterns
//! - **[`indexer`]**: Discovery, lexical analysis, chunking and import extraction
//! - **[`store`]**: In-memory index: file records, symbol table, dependency graph
//! - **[`context`]**: Relevance ranking and token-budgeted context assembly
//! - **[`embedder`]**: Optional embedding-based similarity collaborators
//! - **[`engine`]**: Public entry points tying the pieces together
//! - **[`events`]**: Indexing lifecycle notifications
//! - **[`watcher`]**: File system watching for incremental updates
//! - **[`mcp`]**: MCP server with 8 tool handlers (stdio transport via rmcp)

pub mod config;
pub mod context;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod events;
pub mod indexer;
pub mod mcp;
pub mod store;
pub mod tokens;
pub mod watcher;

pub use engine::ContextEngine;
pub use error::{EngineError, FileIndexError};
