/// Configuration module for codectx.
///
/// Handles loading, validating, and providing default configuration values
/// for the indexing pipeline, the context assembler and the file watcher.
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "codectx.json";

// ── Default value functions ──────────────────────────────────────────

fn default_max_file_size() -> u64 {
    100 * 1024
}

fn default_chunk_max_tokens() -> usize {
    512
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause_ms() -> u64 {
    10
}

fn default_file_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_ignore_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "dist",
        "build",
        "out",
        "target",
        ".next",
        "coverage",
        "__pycache__",
        ".venv",
        "vendor",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ignore_patterns() -> Vec<String> {
    vec!["**/*.min.js".to_string(), "**/*.bundle.js".to_string()]
}

fn default_include_extensions() -> Vec<String> {
    [
        "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt", "cs", "cpp", "c",
        "h", "hpp", "rb", "php", "swift", "vue", "svelte",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_tokens() -> usize {
    8_000
}

fn default_response_buffer() -> f64 {
    0.1
}

fn default_current_file_share() -> f64 {
    0.4
}

fn default_stop_threshold() -> f64 {
    0.9
}

fn default_max_files() -> usize {
    20
}

fn default_max_symbols() -> usize {
    50
}

fn default_recency_fallback_count() -> usize {
    5
}

fn default_recency_fallback_score() -> f64 {
    0.3
}

fn default_semantic_top_k() -> usize {
    10
}

fn default_debounce_ms() -> u64 {
    300
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Files larger than this many bytes are skipped silently.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// A chunk is cut once its estimate reaches this many tokens.
    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,

    /// Files analysed concurrently per indexing batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Per-file analysis timeout.
    #[serde(default = "default_file_timeout_ms")]
    pub file_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,

    /// Directory names skipped anywhere in the tree.
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Glob patterns (relative to the workspace root) that are never indexed.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Extensions (without the dot) that are indexed.
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    /// Total token budget of a context request, response buffer included.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Fraction of the budget held back for the model's response.
    #[serde(default = "default_response_buffer")]
    pub response_buffer: f64,

    /// Largest share of the available budget the current file may take.
    #[serde(default = "default_current_file_share")]
    pub current_file_share: f64,

    /// Selection stops once usage reaches this fraction of the available budget.
    #[serde(default = "default_stop_threshold")]
    pub stop_threshold: f64,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,

    #[serde(default = "default_recency_fallback_count")]
    pub recency_fallback_count: usize,

    #[serde(default = "default_recency_fallback_score")]
    pub recency_fallback_score: f64,

    #[serde(default = "default_true")]
    pub include_second_degree: bool,

    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            chunk_max_tokens: default_chunk_max_tokens(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            file_timeout_ms: default_file_timeout_ms(),
            respect_gitignore: default_true(),
            ignore_dirs: default_ignore_dirs(),
            ignore_patterns: default_ignore_patterns(),
            include_extensions: default_include_extensions(),
            context: ContextConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            response_buffer: default_response_buffer(),
            current_file_share: default_current_file_share(),
            stop_threshold: default_stop_threshold(),
            max_files: default_max_files(),
            max_symbols: default_max_symbols(),
            recency_fallback_count: default_recency_fallback_count(),
            recency_fallback_score: default_recency_fallback_score(),
            include_second_degree: default_true(),
            semantic_top_k: default_semantic_top_k(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// A missing file or invalid JSON yields the default configuration.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");

        // Accept ".ts" as well as "ts"
        for ext in &mut cfg.include_extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        if cfg.include_extensions.is_empty() {
            cfg.include_extensions = default_include_extensions();
        }

        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_file_size > 0, "max_file_size must be positive");
        anyhow::ensure!(self.chunk_max_tokens > 0, "chunk_max_tokens must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.file_timeout_ms > 0, "file_timeout_ms must be positive");
        anyhow::ensure!(
            !self.include_extensions.is_empty(),
            "at least one include extension must be specified"
        );

        let ctx = &self.context;
        anyhow::ensure!(ctx.max_tokens > 0, "context.max_tokens must be positive");
        anyhow::ensure!(ctx.max_files > 0, "context.max_files must be positive");
        anyhow::ensure!(
            (0.0..1.0).contains(&ctx.response_buffer),
            "context.response_buffer must be in [0, 1)"
        );
        anyhow::ensure!(
            ctx.current_file_share > 0.0 && ctx.current_file_share <= 1.0,
            "context.current_file_share must be in (0, 1]"
        );
        anyhow::ensure!(
            ctx.stop_threshold > 0.0 && ctx.stop_threshold <= 1.0,
            "context.stop_threshold must be in (0, 1]"
        );

        self.ignore_matcher()?;
        Ok(())
    }

    /// Whether `ext` (no leading dot) is in the include list.
    #[must_use]
    pub fn is_included_extension(&self, ext: &str) -> bool {
        self.include_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether a directory with this name is skipped.
    #[must_use]
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_dirs.iter().any(|d| d == name)
    }

    /// Compile `ignore_patterns` into a matcher over workspace-relative paths.
    pub fn ignore_matcher(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob =
                Glob::new(pattern).with_context(|| format!("invalid ignore pattern: {pattern}"))?;
            builder.add(glob);
        }
        builder.build().context("failed to build ignore matcher")
    }
}

// ── Tests ────────────────────────────────────────────────────────────
