use std::sync::LazyLock;

use regex::Regex;

use crate::store::models::{ChunkType, SymbolKind};

/// Declaration patterns for one language family.
///
/// Every pattern is matched against a single line and captures the declared
/// name in group 1. Patterns are tried in order and the first match wins, so
/// the more specific shapes come first.
pub struct LanguageConfig {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub declarations: Vec<(SymbolKind, Regex)>,
}

impl LanguageConfig {
    pub fn get_all() -> &'static [LanguageConfig] {
        &LANGUAGES
    }

    pub fn get_by_extension(ext: &str) -> Option<&'static LanguageConfig> {
        let ext = ext.to_ascii_lowercase();
        LANGUAGES
            .iter()
            .find(|c| c.extensions.contains(&ext.as_str()))
    }

    pub fn get_by_name(name: &str) -> Option<&'static LanguageConfig> {
        LANGUAGES.iter().find(|c| c.name == name)
    }

    /// First declaration on `line`, with the char column of its name.
    pub fn match_declaration(&self, line: &str) -> Option<(SymbolKind, String, usize)> {
        if is_comment_line(line) {
            return None;
        }
        self.declarations.iter().find_map(|(kind, re)| {
            let caps = re.captures(line)?;
            let name = caps.get(1)?;
            let column = line[..name.start()].chars().count() + 1;
            Some((*kind, name.as_str().to_string(), column))
        })
    }

    /// Chunk type if `line` opens a function, class or interface.
    pub fn boundary_type(&self, line: &str) -> Option<ChunkType> {
        match self.match_declaration(line)?.0 {
            SymbolKind::Function => Some(ChunkType::Function),
            SymbolKind::Class => Some(ChunkType::Class),
            SymbolKind::Interface => Some(ChunkType::Interface),
            SymbolKind::Variable | SymbolKind::Type => None,
        }
    }
}

/// Language name for an extension; unknown extensions map to themselves.
pub fn detect_language(ext: &str) -> String {
    match LanguageConfig::get_by_extension(ext) {
        Some(config) => config.name.to_string(),
        None => ext.to_ascii_lowercase(),
    }
}

// Single-line comments only; block comment bodies are not tracked.
fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
        || trimmed.starts_with('#')
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("declaration pattern should compile")
}

static LANGUAGES: LazyLock<Vec<LanguageConfig>> = LazyLock::new(|| {
    vec![
        typescript_config(),
        javascript_config(),
        python_config(),
        rust_config(),
        go_config(),
        java_config(),
    ]
});

const ES_FUNCTION: &str =
    r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)";
const ES_CLASS: &str =
    r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)";
const ES_ARROW: &str = r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]*)?=>|[A-Za-z_$][\w$]*\s*=>)";
const ES_VARIABLE: &str = r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)";

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        extensions: &["ts", "tsx", "mts", "cts"],
        declarations: vec![
            (SymbolKind::Function, re(ES_FUNCTION)),
            (SymbolKind::Class, re(ES_CLASS)),
            (
                SymbolKind::Interface,
                re(r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+([A-Za-z_$][\w$]*)"),
            ),
            (
                SymbolKind::Type,
                re(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*="),
            ),
            (
                SymbolKind::Type,
                re(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)"),
            ),
            (SymbolKind::Function, re(ES_ARROW)),
            (SymbolKind::Variable, re(ES_VARIABLE)),
        ],
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        declarations: vec![
            (SymbolKind::Function, re(ES_FUNCTION)),
            (SymbolKind::Class, re(ES_CLASS)),
            (SymbolKind::Function, re(ES_ARROW)),
            (SymbolKind::Variable, re(ES_VARIABLE)),
        ],
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        extensions: &["py", "pyi"],
        declarations: vec![
            (
                SymbolKind::Function,
                re(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"),
            ),
            (SymbolKind::Class, re(r"^\s*class\s+([A-Za-z_]\w*)")),
            // module-level assignments only
            (
                SymbolKind::Variable,
                re(r"^([A-Za-z_]\w*)\s*(?::[^=]*)?=[^=]"),
            ),
        ],
    }
}

const RUST_VIS: &str = r"^\s*(?:pub(?:\([^)]*\))?\s+)?";

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        name: "rust",
        extensions: &["rs"],
        declarations: vec![
            (
                SymbolKind::Function,
                re(&format!(
                    r#"{RUST_VIS}(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#
                )),
            ),
            (
                SymbolKind::Class,
                re(&format!(r"{RUST_VIS}(?:struct|enum|union)\s+([A-Za-z_]\w*)")),
            ),
            (
                SymbolKind::Interface,
                re(&format!(r"{RUST_VIS}(?:unsafe\s+)?trait\s+([A-Za-z_]\w*)")),
            ),
            (
                SymbolKind::Type,
                re(&format!(r"{RUST_VIS}type\s+([A-Za-z_]\w*)")),
            ),
            (
                SymbolKind::Variable,
                re(&format!(
                    r"{RUST_VIS}(?:const|static)\s+(?:mut\s+)?([A-Za-z_]\w*)\s*:"
                )),
            ),
        ],
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        name: "go",
        extensions: &["go"],
        declarations: vec![
            (
                SymbolKind::Function,
                re(r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)"),
            ),
            (
                SymbolKind::Class,
                re(r"^type\s+([A-Za-z_]\w*)\s+struct\b"),
            ),
            (
                SymbolKind::Interface,
                re(r"^type\s+([A-Za-z_]\w*)\s+interface\b"),
            ),
            (SymbolKind::Type, re(r"^type\s+([A-Za-z_]\w*)")),
            (
                SymbolKind::Variable,
                re(r"^(?:var|const)\s+([A-Za-z_]\w*)"),
            ),
        ],
    }
}

fn java_config() -> LanguageConfig {
    LanguageConfig {
        name: "java",
        extensions: &["java"],
        declarations: vec![
            (
                SymbolKind::Class,
                re(r"^\s*(?:(?:public|protected|private|abstract|final|static|sealed)\s+)*(?:class|enum|record)\s+([A-Za-z_]\w*)"),
            ),
            (
                SymbolKind::Interface,
                re(r"^\s*(?:(?:public|protected|private|abstract|static|sealed)\s+)*@?interface\s+([A-Za-z_]\w*)"),
            ),
            (
                SymbolKind::Function,
                re(r"^\s*(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)\s+)+(?:<[^>]+>\s+)?[\w<>\[\],\s]+?\s+([A-Za-z_]\w*)\s*\("),
            ),
        ],
    }
}
