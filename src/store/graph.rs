use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::models::FileRecord;

/// Extensions tried, in order, when an import omits one.
const RESOLVE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "vue", "svelte",
];

/// Directory entry files tried when an import names a directory.
const INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.js",
    "index.jsx",
    "index.mjs",
    "mod.rs",
    "__init__.py",
];

/// ESM specifiers name the emitted `.js`; the source is often TypeScript.
const ESM_SOURCE_MAP: &[(&str, &[&str])] = &[
    (".js", &[".ts", ".tsx"]),
    (".jsx", &[".tsx"]),
    (".mjs", &[".mts"]),
    (".cjs", &[".cts"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
}

/// `from` imports `to`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    /// Number of import specifiers in `from` that resolve to `to`.
    pub weight: usize,
    pub specifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub path: String,
    /// Symbol count plus a small size term.
    pub weight: f64,
    pub in_degree: usize,
    pub out_degree: usize,
    pub connections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    /// Highest weighted degree first.
    pub most_central: Vec<(String, f64)>,
}

/// File-level import graph over the indexed files.
///
/// Edges only ever point at indexed files; unresolved and external imports
/// are dropped during [`DependencyGraph::build`].
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<(String, String), DependencyEdge>,
    outgoing: BTreeMap<String, BTreeSet<String>>,
    incoming: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Builds the graph from scratch over `files`.
    pub fn build(files: &BTreeMap<String, FileRecord>) -> Self {
        let mut graph = Self::default();

        for record in files.values() {
            graph.nodes.insert(
                record.path.clone(),
                GraphNode {
                    path: record.path.clone(),
                    weight: record.symbols.len() as f64 + record.line_count as f64 / 100.0,
                    in_degree: 0,
                    out_degree: 0,
                    connections: 0,
                },
            );
        }

        for record in files.values() {
            for specifier in &record.imports {
                let Some(target) = resolve_import(specifier, &record.path, files) else {
                    continue;
                };
                if target == record.path {
                    continue;
                }
                graph.add_edge(&record.path, &target, specifier);
            }
        }

        graph.refresh_degrees();
        graph
    }

    fn add_edge(&mut self, from: &str, to: &str, specifier: &str) {
        let edge = self
            .edges
            .entry((from.to_string(), to.to_string()))
            .or_insert_with(|| DependencyEdge {
                from: from.to_string(),
                to: to.to_string(),
                kind: EdgeKind::Import,
                weight: 0,
                specifiers: Vec::new(),
            });
        edge.weight += 1;
        edge.specifiers.push(specifier.to_string());

        self.outgoing
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.incoming
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    fn refresh_degrees(&mut self) {
        for (path, node) in &mut self.nodes {
            node.out_degree = self.outgoing.get(path).map_or(0, BTreeSet::len);
            node.in_degree = self.incoming.get(path).map_or(0, BTreeSet::len);
            node.connections = node.in_degree + node.out_degree;
        }
    }

    /// Drops `path` and every edge touching it.
    pub fn prune(&mut self, path: &str) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        self.edges.retain(|(from, to), _| from != path && to != path);
        self.outgoing.remove(path);
        self.incoming.remove(path);
        for targets in self.outgoing.values_mut() {
            targets.remove(path);
        }
        for sources in self.incoming.values_mut() {
            sources.remove(path);
        }
        self.refresh_degrees();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, path: &str) -> Option<&GraphNode> {
        self.nodes.get(path)
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.values()
    }

    /// Whether `from` imports `to`.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.outgoing.get(from).is_some_and(|t| t.contains(to))
    }

    /// Files `path` imports.
    pub fn imports_of(&self, path: &str) -> impl Iterator<Item = &str> {
        self.outgoing
            .get(path)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Files importing `path`.
    pub fn importers_of(&self, path: &str) -> impl Iterator<Item = &str> {
        self.incoming
            .get(path)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Direct neighbours in both directions.
    pub fn neighbors(&self, path: &str) -> BTreeSet<&str> {
        self.imports_of(path).chain(self.importers_of(path)).collect()
    }

    /// Neighbours of neighbours, excluding `path` and its direct neighbours.
    pub fn second_degree(&self, path: &str) -> BTreeSet<&str> {
        let direct = self.neighbors(path);
        direct
            .iter()
            .flat_map(|n| self.neighbors(n))
            .filter(|n| *n != path && !direct.contains(n))
            .collect()
    }

    /// Sum of incident edge weights. Unnormalised; only the ordering matters.
    pub fn centrality(&self, path: &str) -> f64 {
        self.edges
            .values()
            .filter(|e| e.from == path || e.to == path)
            .map(|e| e.weight as f64)
            .sum()
    }

    /// Edges over ordered node pairs.
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n < 2 {
            return 0.0;
        }
        self.edges.len() as f64 / (n * (n - 1)) as f64
    }

    pub fn metrics(&self, top: usize) -> GraphMetrics {
        let mut central: Vec<(String, f64)> = self
            .nodes
            .keys()
            .map(|path| (path.clone(), self.centrality(path)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        central.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        central.truncate(top);

        GraphMetrics {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            density: self.density(),
            most_central: central,
        }
    }
}

/// Resolves an import specifier written in `from` to an indexed path.
///
/// Relative specifiers are joined onto the importer's directory and tried as
/// written, with an ESM source mapping, with each known extension, and as a
/// directory index. Dotted Python modules, `crate::` paths and Java imports
/// are resolved against the tree. Anything else is external.
pub fn resolve_import<V>(
    specifier: &str,
    from: &str,
    files: &BTreeMap<String, V>,
) -> Option<String> {
    let from_dir = parent_dir(from);

    if is_relative(specifier) {
        // `mod x;` in src/foo.rs lives in src/foo/x.rs
        if from.ends_with(".rs") {
            let stem = file_stem(from);
            if !matches!(stem, "mod" | "lib" | "main") {
                let nested = join(&join(from_dir, stem)?, specifier)?;
                if let Some(found) = resolve_path(&nested, files) {
                    return Some(found);
                }
            }
        }
        let joined = join(from_dir, specifier)?;
        return resolve_path(&joined, files);
    }

    if from.ends_with(".py") && is_dotted_module(specifier) {
        return resolve_path(&specifier.replace('.', "/"), files);
    }

    if let Some(rest) = specifier.strip_prefix("crate::") {
        return resolve_rust_crate_path(rest, from, files);
    }

    if from.ends_with(".java") {
        let suffix = format!("{}.java", specifier.replace('.', "/"));
        return files
            .keys()
            .find(|key| *key == &suffix || key.ends_with(&format!("/{suffix}")))
            .cloned();
    }

    None
}

fn resolve_path<V>(path: &str, files: &BTreeMap<String, V>) -> Option<String> {
    if files.contains_key(path) {
        return Some(path.to_string());
    }

    for (emitted, sources) in ESM_SOURCE_MAP {
        if let Some(stem) = path.strip_suffix(emitted) {
            for source in *sources {
                let candidate = format!("{stem}{source}");
                if files.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
        }
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{path}.{ext}");
        if files.contains_key(&candidate) {
            return Some(candidate);
        }
    }

    for index in INDEX_FILES {
        let candidate = if path.is_empty() {
            (*index).to_string()
        } else {
            format!("{path}/{index}")
        };
        if files.contains_key(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// `crate::a::b::C` from `src/x.rs` → `src/a/b.rs`, `src/a/b/mod.rs` or `src/a.rs`.
fn resolve_rust_crate_path<V>(
    rest: &str,
    from: &str,
    files: &BTreeMap<String, V>,
) -> Option<String> {
    let crate_root = match from.rfind("src/") {
        Some(idx) if idx == 0 || from[..idx].ends_with('/') => &from[..idx + 3],
        _ => "",
    };
    let segments: Vec<&str> = rest
        .split("::")
        .map(str::trim)
        .take_while(|s| !s.is_empty() && !s.starts_with('{') && *s != "*")
        .collect();

    for n in (1..=segments.len()).rev() {
        let module = segments[..n].join("/");
        let base = if crate_root.is_empty() {
            module
        } else {
            format!("{crate_root}/{module}")
        };
        for candidate in [format!("{base}.rs"), format!("{base}/mod.rs")] {
            if files.contains_key(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

fn is_dotted_module(specifier: &str) -> bool {
    !specifier.is_empty()
        && specifier
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map_or(name, |idx| &name[..idx])
}

/// Joins `relative` onto `base`, folding `.` and `..`. `None` if it escapes the root.
fn join(base: &str, relative: &str) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
