//! Turning source files into [`FileRecord`](crate::store::models::FileRecord)s:
//! discovery, declaration and import scanning, and chunking.

pub mod chunker;
pub mod code_parser;
pub mod core;
pub mod languages;
pub mod relations;

pub use self::core::{Indexer, relative_path};
