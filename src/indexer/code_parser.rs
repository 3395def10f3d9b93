use super::chunker::split_into_chunks;
use super::languages::{LanguageConfig, detect_language};
use super::relations::{extract_exports, extract_imports, flatten_imports};
use crate::store::models::{ImportedName, SemanticChunk, Symbol};

/// Upper bound on a symbol's definition excerpt, in chars.
const EXCERPT_MAX_CHARS: usize = 200;
/// Lines taken into an excerpt, starting at the declaration.
const EXCERPT_MAX_LINES: usize = 3;

/// Everything extracted from one file's content.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSource {
    pub language: String,
    pub line_count: usize,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<String>,
    pub imported_names: Vec<ImportedName>,
    pub exports: Vec<String>,
    pub chunks: Vec<SemanticChunk>,
}

/// Lexical source analyser.
///
/// Scans line by line with the declaration patterns of the file's language.
/// Declarations inside block comments or string literals can be picked up;
/// single-line comments are skipped.
#[derive(Debug, Clone, Copy)]
pub struct CodeParser {
    chunk_max_tokens: usize,
}

impl CodeParser {
    pub fn new(chunk_max_tokens: usize) -> Self {
        Self { chunk_max_tokens }
    }

    /// Analyse `content` of the file at workspace-relative `path`.
    pub fn parse(&self, path: &str, extension: &str, content: &str) -> ParsedSource {
        let config = LanguageConfig::get_by_extension(extension);
        let language = detect_language(extension);

        let symbols = config
            .map(|c| extract_symbols(path, content, c))
            .unwrap_or_default();
        let statements = extract_imports(content, &language);
        let (imports, imported_names) = flatten_imports(&statements);
        let exports = extract_exports(content, &language, &symbols);
        let chunks = split_into_chunks(content, config, self.chunk_max_tokens);

        ParsedSource {
            language,
            line_count: content.lines().count(),
            symbols,
            imports,
            imported_names,
            exports,
            chunks,
        }
    }
}

/// Extract declared symbols, one at most per line.
pub fn extract_symbols(path: &str, content: &str, config: &LanguageConfig) -> Vec<Symbol> {
    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        if let Some((kind, name, column)) = config.match_declaration(line) {
            symbols.push(Symbol {
                name,
                kind,
                line: index + 1,
                column,
                excerpt: excerpt(&lines[index..]),
                path: path.to_string(),
            });
        }
    }
    symbols
}

fn excerpt(lines: &[&str]) -> String {
    let joined = lines
        .iter()
        .take(EXCERPT_MAX_LINES)
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim();
    match trimmed.char_indices().nth(EXCERPT_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
