use crate::config::Config;
use crate::error::{EngineError, FileIndexError};
use crate::indexer::code_parser::{CodeParser, ParsedSource};
use crate::store::models::FileRecord;
use chrono::{DateTime, Utc};
use globset::GlobSet;
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outcome of one file in a batch, keyed by its absolute path.
pub type BatchResult = (PathBuf, Result<FileRecord, FileIndexError>);

/// Discovers candidate files and turns each into a [`FileRecord`].
///
/// The indexer never touches the store; callers write the returned records.
#[derive(Clone)]
pub struct Indexer {
    config: Arc<Config>,
    ignore: Arc<GlobSet>,
    parser: CodeParser,
}

impl Indexer {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let ignore = Arc::new(config.ignore_matcher()?);
        let parser = CodeParser::new(config.chunk_max_tokens);
        Ok(Self {
            config,
            ignore,
            parser,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Walks `root` and returns indexable files in a deterministic order.
    ///
    /// Respects `.gitignore` (when configured), the ignored directory list,
    /// the ignore globs and the extension allow-list.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let metadata = std::fs::metadata(root).map_err(|source| EngineError::WorkspaceAccess {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(EngineError::WorkspaceAccess {
                path: root.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let ignore_dirs = self.config.ignore_dirs.clone();
        let respect_gitignore = self.config.respect_gitignore;

        // Walk builder respects .gitignore even outside a git checkout
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(respect_gitignore)
            .git_global(respect_gitignore)
            .git_exclude(respect_gitignore)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry.file_type().is_some_and(|t| t.is_dir())
                    || !ignore_dirs
                        .iter()
                        .any(|d| entry.file_name().to_str() == Some(d.as_str()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            match self.check_candidate(root, entry.path()) {
                Ok(_) => files.push(entry.into_path()),
                Err(reason) => debug!("Skipping {}: {reason}", entry.path().display()),
            }
        }

        Ok(files)
    }

    /// Validates `path` against the filters and returns its relative key.
    pub fn check_candidate(&self, root: &Path, path: &Path) -> Result<String, FileIndexError> {
        let relative = relative_path(root, path).ok_or(FileIndexError::Ignored)?;

        let ext = extension_of(path);
        if !self.config.is_included_extension(&ext) {
            return Err(FileIndexError::Unsupported(ext));
        }

        let mut dirs = relative.split('/').rev().skip(1);
        if dirs.any(|d| self.config.is_ignored_dir(d)) {
            return Err(FileIndexError::Ignored);
        }
        if self.ignore.is_match(&relative) {
            return Err(FileIndexError::Ignored);
        }

        Ok(relative)
    }

    /// Reads and analyses one file under the per-file timeout.
    ///
    /// Files above the size ceiling fail with [`FileIndexError::TooLarge`]
    /// before any content is read.
    pub async fn index_file(&self, root: &Path, path: &Path) -> Result<FileRecord, FileIndexError> {
        let relative = self.check_candidate(root, path)?;

        let metadata = tokio::fs::metadata(path).await?;
        let limit = self.config.max_file_size;
        if metadata.len() > limit {
            return Err(FileIndexError::TooLarge {
                size: metadata.len(),
                limit,
            });
        }
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let extension = extension_of(path);

        let timeout = Duration::from_millis(self.config.file_timeout_ms);
        let parser = self.parser;
        let task = {
            let path = path.to_path_buf();
            let relative = relative.clone();
            let extension = extension.clone();
            tokio::task::spawn_blocking(move || -> Result<ParsedSource, FileIndexError> {
                let bytes = std::fs::read(&path)?;
                if bytes.contains(&0) {
                    return Err(FileIndexError::Binary);
                }
                let content = String::from_utf8_lossy(&bytes);
                Ok(parser.parse(&relative, &extension, &content))
            })
        };

        let parsed = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(FileIndexError::Timeout(timeout)),
            Ok(Err(join_error)) => return Err(FileIndexError::Task(join_error.to_string())),
            Ok(Ok(result)) => result?,
        };

        debug!(
            "Indexed {relative}: {} symbols, {} chunks",
            parsed.symbols.len(),
            parsed.chunks.len()
        );

        Ok(FileRecord {
            path: relative,
            absolute_path: path.to_path_buf(),
            size: metadata.len(),
            modified,
            language: parsed.language,
            extension,
            line_count: parsed.line_count,
            symbols: parsed.symbols,
            imports: parsed.imports,
            imported_names: parsed.imported_names,
            exports: parsed.exports,
            chunks: parsed.chunks,
        })
    }

    /// Indexes `paths` concurrently and waits for the whole batch.
    ///
    /// Results come back in completion order, one per path. A task that fails
    /// to join is reported as [`FileIndexError::Task`] for its path.
    pub async fn index_batch(&self, root: &Path, paths: &[PathBuf]) -> Vec<BatchResult> {
        let mut set = JoinSet::new();
        for path in paths {
            let indexer = self.clone();
            let root = root.to_path_buf();
            let path = path.clone();
            set.spawn(async move {
                let result = indexer.index_file(&root, &path).await;
                (path, result)
            });
        }

        join_batch(set, paths).await
    }
}

/// Drains `set`, giving every path in `paths` exactly one result.
async fn join_batch(mut set: JoinSet<BatchResult>, paths: &[PathBuf]) -> Vec<BatchResult> {
    let mut results = Vec::with_capacity(paths.len());
    let mut join_errors = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("Indexing task failed to join: {e}");
                join_errors.push(e.to_string());
            }
        }
    }

    if !join_errors.is_empty() {
        let message = join_errors.join("; ");
        let missing: Vec<PathBuf> = paths
            .iter()
            .filter(|p| !results.iter().any(|(done, _)| done == *p))
            .cloned()
            .collect();
        for path in missing {
            results.push((path, Err(FileIndexError::Task(message.clone()))));
        }
    }
    results
}

/// `path` relative to `root`, with `/` separators on every platform.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}
