use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::store::models::{ImportedName, Symbol};

/// One import statement: the specifier plus the names it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub target: String,
    pub names: Vec<String>,
    pub line: usize,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("import/export pattern should compile")
}

// ── Import patterns ──────────────────────────────────────────────────

static ES_IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?m)^[ \t]*import\s+(?:type\s+)?([^'";]*?)\s*from\s*['"]([^'"]+)['"]"#)
});
static ES_IMPORT_BARE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?m)^[ \t]*import\s*['"]([^'"]+)['"]"#));
static ES_REEXPORT: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?m)^[ \t]*export\s+(?:type\s+)?([^'";]*?)\s*from\s*['"]([^'"]+)['"]"#)
});
static ES_REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#));
static ES_DYNAMIC: LazyLock<Regex> =
    LazyLock::new(|| re(r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#));

static PY_FROM: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*from\s+(\.*[\w.]*)\s+import\s+(\([^)]*\)|[^\n#]+)"));
static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)"));

static RS_USE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;]+);"));
static RS_MOD: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;"));

static GO_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?m)^[ \t]*import\s+(?:[\w.]+\s+)?"([^"]+)""#));
static GO_IMPORT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?ms)^[ \t]*import\s*\((.*?)\)"));
static QUOTED: LazyLock<Regex> = LazyLock::new(|| re(r#""([^"]+)""#));

static JAVA_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;"));

// ── Export patterns ──────────────────────────────────────────────────

static ES_EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?m)^[ \t]*export\s+(?:declare\s+)?(?:default\s+)?(?:async\s+)?(?:abstract\s+)?(?:function\s*\*?|class|interface|type|const\s+enum|const|let|var|enum)\s+([A-Za-z_$][\w$]*)")
});
static ES_EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*export\s*\{([^}]*)\}"));
static ES_EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?[ \t]*$"));
static CJS_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*="));
static CJS_EXPORT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*module\.exports\s*=\s*\{([^}]*)\}"));

static RS_PUB: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?m)^[ \t]*pub\s+(?:async\s+)?(?:unsafe\s+)?(?:const\s+)?(?:fn|struct|enum|trait|type|const|static|mod|union)\s+([A-Za-z_]\w*)")
});
static JAVA_PUBLIC: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?m)^[ \t]*public\s+(?:(?:abstract|final|static|sealed)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)")
});

/// 1-based line containing byte offset `offset`.
fn line_at(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

/// Extract import statements for `lang` (as named by `LanguageConfig`).
pub fn extract_imports(content: &str, lang: &str) -> Vec<ImportStatement> {
    match lang {
        "typescript" | "javascript" => extract_es_imports(content),
        "python" => extract_python_imports(content),
        "rust" => extract_rust_imports(content),
        "go" => extract_go_imports(content),
        "java" => extract_java_imports(content),
        _ => Vec::new(),
    }
}

fn extract_es_imports(content: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();

    for pattern in [&*ES_IMPORT_FROM, &*ES_REEXPORT] {
        for caps in pattern.captures_iter(content) {
            let (Some(clause), Some(target)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            imports.push(ImportStatement {
                target: target.as_str().to_string(),
                names: es_clause_names(clause.as_str()),
                line: line_at(content, caps.get(0).map_or(0, |m| m.start())),
            });
        }
    }

    for pattern in [&*ES_IMPORT_BARE, &*ES_REQUIRE, &*ES_DYNAMIC] {
        for caps in pattern.captures_iter(content) {
            if let Some(target) = caps.get(1) {
                imports.push(ImportStatement {
                    target: target.as_str().to_string(),
                    names: Vec::new(),
                    line: line_at(content, target.start()),
                });
            }
        }
    }

    imports.sort_by_key(|i| i.line);
    imports
}

/// Names bound by an ES import clause, e.g. `Def, { a, b as c }` → `[Def, a, b]`.
fn es_clause_names(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let (outer, inner) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{}{}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in outer.split(',') {
        let part = part.trim();
        // namespace imports bind no individual name
        if part.is_empty() || part.starts_with('*') {
            continue;
        }
        if is_identifier(part) {
            names.push(part.to_string());
        }
    }

    if let Some(inner) = inner {
        for item in inner.split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            let original = item.split(" as ").next().unwrap_or("").trim();
            if is_identifier(original) && original != "default" {
                names.push(original.to_string());
            }
        }
    }

    names
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn extract_python_imports(content: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();

    for caps in PY_FROM.captures_iter(content) {
        let (Some(module), Some(bound)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let names = bound
            .as_str()
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .filter_map(|item| item.split_whitespace().next())
            .filter(|name| is_identifier(name))
            .map(String::from)
            .collect();
        imports.push(ImportStatement {
            target: python_specifier(module.as_str()),
            names,
            line: line_at(content, module.start()),
        });
    }

    for caps in PY_IMPORT.captures_iter(content) {
        let Some(list) = caps.get(1) else { continue };
        let line = line_at(content, list.start());
        for item in list.as_str().split(',') {
            if let Some(module) = item.split_whitespace().next() {
                imports.push(ImportStatement {
                    target: python_specifier(module),
                    names: Vec::new(),
                    line,
                });
            }
        }
    }

    imports.sort_by_key(|i| i.line);
    imports
}

/// `.utils` → `./utils`, `..pkg.mod` → `../pkg/mod`; absolute modules are kept dotted.
fn python_specifier(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return module.to_string();
    }
    let rest = module[dots..].replace('.', "/");
    let prefix = if dots == 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    format!("{prefix}{rest}")
}

fn extract_rust_imports(content: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();

    for caps in RS_USE.captures_iter(content) {
        let Some(path) = caps.get(1) else { continue };
        let target: String = path.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        imports.push(ImportStatement {
            names: rust_use_names(&target),
            target,
            line: line_at(content, path.start()),
        });
    }

    for caps in RS_MOD.captures_iter(content) {
        let Some(name) = caps.get(1) else { continue };
        imports.push(ImportStatement {
            target: format!("./{}", name.as_str()),
            names: Vec::new(),
            line: line_at(content, name.start()),
        });
    }

    imports.sort_by_key(|i| i.line);
    imports
}

/// Names bound by a `use` tree: `a::b::{C, D as E}` → `[C, D]`, `a::F` → `[F]`.
fn rust_use_names(target: &str) -> Vec<String> {
    let items: Vec<&str> = match (target.rfind('{'), target.rfind('}')) {
        (Some(open), Some(close)) if open < close => target[open + 1..close].split(',').collect(),
        _ => vec![target.rsplit("::").next().unwrap_or(target)],
    };

    items
        .into_iter()
        .filter_map(|item| {
            let item = item.trim();
            let last = item.rsplit("::").next().unwrap_or(item);
            let name = last.split(" as ").next().unwrap_or("").trim();
            (is_identifier(name) && name != "self" && name != "super" && name != "crate")
                .then(|| name.to_string())
        })
        .collect()
}

fn extract_go_imports(content: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();

    for caps in GO_IMPORT.captures_iter(content) {
        if let Some(target) = caps.get(1) {
            imports.push(ImportStatement {
                target: target.as_str().to_string(),
                names: Vec::new(),
                line: line_at(content, target.start()),
            });
        }
    }

    for caps in GO_IMPORT_BLOCK.captures_iter(content) {
        let Some(block) = caps.get(1) else { continue };
        for quoted in QUOTED.captures_iter(block.as_str()) {
            if let Some(target) = quoted.get(1) {
                imports.push(ImportStatement {
                    target: target.as_str().to_string(),
                    names: Vec::new(),
                    line: line_at(content, block.start() + target.start()),
                });
            }
        }
    }

    imports.sort_by_key(|i| i.line);
    imports
}

fn extract_java_imports(content: &str) -> Vec<ImportStatement> {
    JAVA_IMPORT
        .captures_iter(content)
        .filter_map(|caps| {
            let target = caps.get(1)?;
            let last = target.as_str().rsplit('.').next().unwrap_or("");
            Some(ImportStatement {
                target: target.as_str().to_string(),
                names: if is_identifier(last) {
                    vec![last.to_string()]
                } else {
                    Vec::new()
                },
                line: line_at(content, target.start()),
            })
        })
        .collect()
}

/// Deduplicated specifiers and imported names of a statement list.
pub fn flatten_imports(statements: &[ImportStatement]) -> (Vec<String>, Vec<ImportedName>) {
    let mut seen_targets = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut targets = Vec::new();
    let mut names = Vec::new();

    for statement in statements {
        if seen_targets.insert(statement.target.as_str()) {
            targets.push(statement.target.clone());
        }
        for name in &statement.names {
            if seen_names.insert(name.as_str()) {
                names.push(ImportedName {
                    name: name.clone(),
                    line: statement.line,
                });
            }
        }
    }

    (targets, names)
}

/// Extract exported names for `lang`, using `symbols` for languages whose
/// visibility is implied by naming or position rather than a keyword.
pub fn extract_exports(content: &str, lang: &str, symbols: &[Symbol]) -> Vec<String> {
    let mut exports: Vec<String> = Vec::new();

    match lang {
        "typescript" | "javascript" => {
            for pattern in [&*ES_EXPORT_DECL, &*ES_EXPORT_DEFAULT, &*CJS_EXPORT] {
                for caps in pattern.captures_iter(content) {
                    if let Some(name) = caps.get(1) {
                        exports.push(name.as_str().to_string());
                    }
                }
            }
            for caps in ES_EXPORT_LIST.captures_iter(content) {
                let Some(list) = caps.get(1) else { continue };
                for item in list.as_str().split(',') {
                    let item = item.trim().trim_start_matches("type ").trim();
                    let exported = item.rsplit(" as ").next().unwrap_or("").trim();
                    if is_identifier(exported) {
                        exports.push(exported.to_string());
                    }
                }
            }
            for caps in CJS_EXPORT_OBJECT.captures_iter(content) {
                let Some(list) = caps.get(1) else { continue };
                for item in list.as_str().split(',') {
                    let key = item.split(':').next().unwrap_or("").trim();
                    if is_identifier(key) {
                        exports.push(key.to_string());
                    }
                }
            }
        }
        "rust" => {
            for caps in RS_PUB.captures_iter(content) {
                if let Some(name) = caps.get(1) {
                    exports.push(name.as_str().to_string());
                }
            }
        }
        "java" => {
            for caps in JAVA_PUBLIC.captures_iter(content) {
                if let Some(name) = caps.get(1) {
                    exports.push(name.as_str().to_string());
                }
            }
        }
        "go" => exports.extend(
            symbols
                .iter()
                .filter(|s| s.name.starts_with(|c: char| c.is_uppercase()))
                .map(|s| s.name.clone()),
        ),
        "python" => exports.extend(
            symbols
                .iter()
                .filter(|s| s.column == 1 && !s.name.starts_with('_'))
                .map(|s| s.name.clone()),
        ),
        _ => {}
    }

    let mut seen = HashSet::new();
    exports.retain(|name| seen.insert(name.clone()));
    exports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_es_imports() {
        let source = r#"import React, { useState, useEffect as effect } from 'react';
import type { User } from "./types";
import './styles.css';
import {
  foo,
  bar,
} from './a';
export { helper } from './helpers';
const fs = require('fs');
const lazy = () => import('./lazy');
"#;
        let imports = extract_imports(source, "typescript");
        let targets: Vec<&str> = imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["react", "./types", "./styles.css", "./a", "./helpers", "fs", "./lazy"]
        );

        assert_eq!(imports[0].names, vec!["React", "useState", "useEffect"]);
        assert_eq!(imports[1].names, vec!["User"]);
        assert_eq!(imports[3].names, vec!["foo", "bar"]);
        assert_eq!(imports[3].line, 4);
        assert_eq!(imports[4].names, vec!["helper"]);
    }

    #[test]
    fn test_namespace_import_binds_nothing() {
        let imports = extract_imports("import * as path from 'path';\n", "javascript");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].names.is_empty());
    }

    #[test]
    fn test_python_imports() {
        let source = "import os, sys\nfrom .utils import load, save as store\nfrom ..core.models import (User)\nfrom pkg.mod import thing\n";
        let imports = extract_imports(source, "python");
        let targets: Vec<&str> = imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["os", "sys", "./utils", "../core/models", "pkg.mod"]);
        assert_eq!(imports[2].names, vec!["load", "save"]);
        assert_eq!(imports[3].names, vec!["User"]);
    }

    #[test]
    fn test_rust_imports() {
        let source = "use std::collections::{HashMap, HashSet as Set};\nuse crate::store::IndexStore;\nmod graph;\npub mod search;\n";
        let imports = extract_imports(source, "rust");
        assert_eq!(imports[0].names, vec!["HashMap", "HashSet"]);
        assert_eq!(imports[1].names, vec!["IndexStore"]);
        assert_eq!(imports[2].target, "./graph");
        assert_eq!(imports[3].target, "./search");
    }

    #[test]
    fn test_go_imports() {
        let source = "package main\n\nimport \"fmt\"\n\nimport (\n\t\"os\"\n\tlog \"github.com/x/log\"\n)\n";
        let imports = extract_imports(source, "go");
        let targets: Vec<&str> = imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["fmt", "os", "github.com/x/log"]);
        assert_eq!(imports[1].line, 6);
    }

    #[test]
    fn test_java_imports() {
        let imports = extract_imports("import java.util.List;\nimport static org.x.Y.*;\n", "java");
        assert_eq!(imports[0].names, vec!["List"]);
        assert!(imports[1].names.is_empty());
    }

    #[test]
    fn test_flatten_dedupes() {
        let statements = vec![
            ImportStatement {
                target: "./a".to_string(),
                names: vec!["foo".to_string()],
                line: 1,
            },
            ImportStatement {
                target: "./a".to_string(),
                names: vec!["foo".to_string(), "bar".to_string()],
                line: 2,
            },
        ];
        let (targets, names) = flatten_imports(&statements);
        assert_eq!(targets, vec!["./a"]);
        let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[test]
    fn test_es_exports() {
        let source = "export function foo() {}\nexport const bar = 1;\nconst a = 1, b = 2;\nexport { a, b as renamed };\nexport default Widget;\nmodule.exports.legacy = 3;\n";
        let exports = extract_exports(source, "typescript", &[]);
        assert_eq!(exports, vec!["foo", "bar", "Widget", "legacy", "a", "renamed"]);
    }

    #[test]
    fn test_rust_exports_skip_restricted() {
        let source = "pub fn open() {}\npub(crate) fn hidden() {}\npub struct Store;\nfn private() {}\n";
        let exports = extract_exports(source, "rust", &[]);
        assert_eq!(exports, vec!["open", "Store"]);
    }
}
