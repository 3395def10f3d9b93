use super::IndexStore;
use super::models::{FileRecord, SymbolLocation, SymbolRole};
use crate::error::EngineError;
use regex::RegexBuilder;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub case_sensitive: bool,
    /// Treat the query as a regular expression.
    #[serde(default)]
    pub regex: bool,
}

enum Matcher {
    Regex(regex::Regex),
    Exact(String),
    Folded(String),
}

impl Matcher {
    fn new(query: &str, options: SearchOptions) -> Result<Self, EngineError> {
        if options.regex {
            let re = RegexBuilder::new(query)
                .case_insensitive(!options.case_sensitive)
                .build()?;
            return Ok(Matcher::Regex(re));
        }
        Ok(if options.case_sensitive {
            Matcher::Exact(query.to_string())
        } else {
            Matcher::Folded(query.to_lowercase())
        })
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(haystack),
            Matcher::Exact(needle) => haystack.contains(needle.as_str()),
            Matcher::Folded(needle) => haystack.to_lowercase().contains(needle.as_str()),
        }
    }

    fn matches_record(&self, record: &FileRecord) -> bool {
        self.is_match(&record.path)
            || record.symbols.iter().any(|s| self.is_match(&s.name))
            || record.chunks.iter().any(|c| self.is_match(&c.content))
    }
}

impl IndexStore {
    /// Files whose path, symbol names or content match `query`, in path order.
    pub fn search_files(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<&FileRecord>, EngineError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let matcher = Matcher::new(query, options)?;
        Ok(self
            .files
            .values()
            .filter(|record| matcher.matches_record(record))
            .collect())
    }

    /// Graph neighbours of `path`: direct ones first, most connected first,
    /// then second-degree ones.
    pub fn related_files(&self, path: &str, max_results: usize) -> Vec<&FileRecord> {
        let by_weight = |paths: Vec<&str>| {
            let mut records: Vec<&FileRecord> =
                paths.into_iter().filter_map(|p| self.files.get(p)).collect();
            records.sort_by(|a, b| {
                let weight = |r: &FileRecord| self.graph.node(&r.path).map_or(0, |n| n.connections);
                weight(b).cmp(&weight(a)).then_with(|| a.path.cmp(&b.path))
            });
            records
        };

        let mut related = by_weight(self.graph.neighbors(path).into_iter().collect());
        related.extend(by_weight(self.graph.second_degree(path).into_iter().collect()));
        related.truncate(max_results);
        related
    }

    /// Definition sites of `name`. Unknown names yield an empty list.
    pub fn find_symbol(&self, name: &str) -> Vec<SymbolLocation> {
        self.locations_with_role(name, SymbolRole::Definition)
    }

    /// Files importing `name`.
    pub fn find_references(&self, name: &str) -> Vec<SymbolLocation> {
        self.locations_with_role(name, SymbolRole::Reference)
    }

    /// Every symbol-table entry for `name`.
    pub fn symbol_locations(&self, name: &str) -> &[SymbolLocation] {
        self.symbols.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `name` is defined anywhere in the index.
    pub fn is_defined(&self, name: &str) -> bool {
        self.symbol_locations(name)
            .iter()
            .any(|loc| loc.role == SymbolRole::Definition)
    }

    fn locations_with_role(&self, name: &str, role: SymbolRole) -> Vec<SymbolLocation> {
        self.symbol_locations(name)
            .iter()
            .filter(|loc| loc.role == role)
            .cloned()
            .collect()
    }
}
