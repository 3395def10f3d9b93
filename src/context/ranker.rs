use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use super::QueryTerms;
use crate::config::ContextConfig;
use crate::embedder::SemanticSearch;
use crate::store::IndexStore;
use crate::store::models::{FileRecord, SymbolRole};

/// Discount applied to a strategy's score when the file is already a candidate.
pub const MERGE_DISCOUNT: f64 = 0.8;

const DEPENDENCY_BASE: f64 = 0.5;
const IMPORTED_BY_CURRENT_BONUS: f64 = 0.3;
const IMPORTS_CURRENT_BONUS: f64 = 0.2;
const SYMBOL_DEFINITION_SCORE: f64 = 0.8;
const SYMBOL_REFERENCE_SCORE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceReason {
    KeywordMatch,
    DependencyRelationship,
    SymbolDefinition,
    SymbolUsage,
    SemanticSimilarity,
    RecencyFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    Lexical,
    Dependency,
    Symbol,
    Semantic,
    Recency,
    MultiStrategy,
}

/// A file scored for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RelevanceCandidate<'a> {
    #[serde(serialize_with = "serialize_path")]
    pub file: &'a FileRecord,
    /// In `[0, 1]`.
    pub score: f64,
    /// Sum of the raw strategy scores; breaks ties between equal scores.
    pub evidence: f64,
    pub reasons: BTreeSet<RelevanceReason>,
    pub strategy: RankingStrategy,
}

fn serialize_path<S: serde::Serializer>(file: &&FileRecord, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&file.path)
}

/// Scores candidate files with independent strategies and merges the results.
pub struct RelevanceRanker<'a> {
    store: &'a IndexStore,
    config: &'a ContextConfig,
    semantic: Option<&'a SemanticSearch>,
}

impl<'a> RelevanceRanker<'a> {
    pub fn new(store: &'a IndexStore, config: &'a ContextConfig) -> Self {
        Self {
            store,
            config,
            semantic: None,
        }
    }

    pub fn with_semantic(mut self, semantic: Option<&'a SemanticSearch>) -> Self {
        self.semantic = semantic;
        self
    }

    /// Candidates for `terms`, best first. `current` is never a candidate.
    pub fn rank(&self, terms: &QueryTerms, current: Option<&str>) -> Vec<RelevanceCandidate<'a>> {
        let mut merged: BTreeMap<&'a str, RelevanceCandidate<'a>> = BTreeMap::new();

        let strategies = [
            self.lexical(terms),
            self.dependency(current),
            self.symbol(terms),
            self.semantic(terms),
        ];
        for (file, score, reasons, strategy) in strategies.into_iter().flatten() {
            if Some(file.path.as_str()) == current {
                continue;
            }
            merge(&mut merged, file, score, reasons, strategy);
        }

        if merged.is_empty() {
            for (file, score, reasons, strategy) in self.recency(current) {
                merge(&mut merged, file, score, reasons, strategy);
            }
        }

        let mut ranked: Vec<RelevanceCandidate<'a>> = merged.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.evidence.total_cmp(&a.evidence))
                .then_with(|| a.file.path.cmp(&b.file.path))
        });
        debug!("Ranked {} candidates", ranked.len());
        ranked
    }

    /// Share of query keywords found in the file's path, symbols or content.
    fn lexical(&self, terms: &QueryTerms) -> Vec<Hit<'a>> {
        if terms.keywords.is_empty() {
            return Vec::new();
        }
        let total = terms.keywords.len() as f64;

        self.store
            .records()
            .filter_map(|file| {
                let haystack = searchable_text(file);
                let matched = terms
                    .keywords
                    .iter()
                    .filter(|k| haystack.contains(k.as_str()))
                    .count();
                (matched > 0).then(|| {
                    (
                        file,
                        matched as f64 / total,
                        BTreeSet::from([RelevanceReason::KeywordMatch]),
                        RankingStrategy::Lexical,
                    )
                })
            })
            .collect()
    }

    /// Graph neighbours of the current file.
    fn dependency(&self, current: Option<&str>) -> Vec<Hit<'a>> {
        let Some(current) = current else {
            return Vec::new();
        };
        let graph = self.store.graph();
        let mut hits = Vec::new();

        for path in graph.neighbors(current) {
            let Some(file) = self.store.get(path) else {
                continue;
            };
            let mut score = DEPENDENCY_BASE;
            if graph.has_edge(current, path) {
                score += IMPORTED_BY_CURRENT_BONUS;
            }
            if graph.has_edge(path, current) {
                score += IMPORTS_CURRENT_BONUS;
            }
            hits.push((
                file,
                score.min(1.0),
                BTreeSet::from([RelevanceReason::DependencyRelationship]),
                RankingStrategy::Dependency,
            ));
        }

        if self.config.include_second_degree {
            for path in graph.second_degree(current) {
                if let Some(file) = self.store.get(path) {
                    hits.push((
                        file,
                        DEPENDENCY_BASE,
                        BTreeSet::from([RelevanceReason::DependencyRelationship]),
                        RankingStrategy::Dependency,
                    ));
                }
            }
        }
        hits
    }

    /// Files defining or importing the requested symbols.
    fn symbol(&self, terms: &QueryTerms) -> Vec<Hit<'a>> {
        let mut scores: BTreeMap<&str, (f64, BTreeSet<RelevanceReason>)> = BTreeMap::new();

        for name in &terms.symbols {
            let locations = self.store.symbol_locations(name);
            let definers: BTreeSet<&str> = locations
                .iter()
                .filter(|l| l.role == SymbolRole::Definition)
                .map(|l| l.path.as_str())
                .collect();
            let users: BTreeSet<&str> = locations
                .iter()
                .filter(|l| l.role == SymbolRole::Reference)
                .map(|l| l.path.as_str())
                .filter(|p| !definers.contains(p))
                .collect();

            for path in definers {
                let entry = scores.entry(path).or_default();
                entry.0 += SYMBOL_DEFINITION_SCORE;
                entry.1.insert(RelevanceReason::SymbolDefinition);
            }
            for path in users {
                let entry = scores.entry(path).or_default();
                entry.0 += SYMBOL_REFERENCE_SCORE;
                entry.1.insert(RelevanceReason::SymbolUsage);
            }
        }

        scores
            .into_iter()
            .filter_map(|(path, (score, reasons))| {
                let file = self.store.get(path)?;
                Some((file, score.min(1.0), reasons, RankingStrategy::Symbol))
            })
            .collect()
    }

    /// Nearest files from the similarity service, when one is configured.
    fn semantic(&self, terms: &QueryTerms) -> Vec<Hit<'a>> {
        let Some(search) = self.semantic else {
            return Vec::new();
        };
        if terms.query.trim().is_empty() {
            return Vec::new();
        }

        match search.search(&terms.query, self.config.semantic_top_k) {
            Ok(neighbors) => neighbors
                .into_iter()
                .filter_map(|(path, similarity)| {
                    let file = self.store.get(&path)?;
                    Some((
                        file,
                        f64::from(similarity).clamp(0.0, 1.0),
                        BTreeSet::from([RelevanceReason::SemanticSimilarity]),
                        RankingStrategy::Semantic,
                    ))
                })
                .collect(),
            Err(e) => {
                warn!("Semantic search unavailable, ranking without it: {e}");
                Vec::new()
            }
        }
    }

    /// Most recently modified files at a flat, low score.
    fn recency(&self, current: Option<&str>) -> Vec<Hit<'a>> {
        let mut files: Vec<&'a FileRecord> = self
            .store
            .records()
            .filter(|f| Some(f.path.as_str()) != current)
            .collect();
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));

        files
            .into_iter()
            .take(self.config.recency_fallback_count)
            .map(|file| {
                (
                    file,
                    self.config.recency_fallback_score,
                    BTreeSet::from([RelevanceReason::RecencyFallback]),
                    RankingStrategy::Recency,
                )
            })
            .collect()
    }
}

type Hit<'a> = (&'a FileRecord, f64, BTreeSet<RelevanceReason>, RankingStrategy);

fn merge<'a>(
    merged: &mut BTreeMap<&'a str, RelevanceCandidate<'a>>,
    file: &'a FileRecord,
    score: f64,
    reasons: BTreeSet<RelevanceReason>,
    strategy: RankingStrategy,
) {
    match merged.get_mut(file.path.as_str()) {
        Some(existing) => {
            existing.score = existing.score.max(score * MERGE_DISCOUNT);
            existing.evidence += score;
            existing.reasons.extend(reasons);
            if existing.strategy != strategy {
                existing.strategy = RankingStrategy::MultiStrategy;
            }
        }
        None => {
            merged.insert(
                file.path.as_str(),
                RelevanceCandidate {
                    file,
                    score,
                    evidence: score,
                    reasons,
                    strategy,
                },
            );
        }
    }
}

fn searchable_text(file: &FileRecord) -> String {
    let mut text = file.path.to_lowercase();
    for symbol in &file.symbols {
        text.push('\n');
        text.push_str(&symbol.name.to_lowercase());
    }
    for chunk in &file.chunks {
        text.push('\n');
        text.push_str(&chunk.content.to_lowercase());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextRequest;
    use crate::store::documents::tests::record_from_source;
    use chrono::{Duration, Utc};

    fn store() -> IndexStore {
        let mut store = IndexStore::new();
        store.upsert(record_from_source("a.ts", "export function foo() {\n  return 1;\n}\n"));
        store.upsert(record_from_source(
            "b.ts",
            "import { foo } from './a';\nexport function bar() {\n  return foo();\n}\n",
        ));
        store.upsert(record_from_source("c.ts", "export const unrelated = 42;\n"));
        store.rebuild_graph();
        store
    }

    fn terms(store: &IndexStore, query: &str, symbols: &[&str]) -> QueryTerms {
        let request = ContextRequest {
            query: Some(query.to_string()),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..ContextRequest::default()
        };
        QueryTerms::new(&request, store)
    }

    fn paths<'a>(ranked: &'a [RelevanceCandidate<'_>]) -> Vec<&'a str> {
        ranked.iter().map(|c| c.file.path.as_str()).collect()
    }

    #[test]
    fn test_definer_outranks_lexical_only() {
        let store = store();
        let config = ContextConfig::default();
        let ranked = RelevanceRanker::new(&store, &config).rank(&terms(&store, "foo", &[]), None);

        assert_eq!(paths(&ranked), vec!["a.ts", "b.ts"]);
        assert!(ranked[0].reasons.contains(&RelevanceReason::SymbolDefinition));
        assert!(ranked[1].reasons.contains(&RelevanceReason::SymbolUsage));
        assert_eq!(ranked[0].strategy, RankingStrategy::MultiStrategy);
    }

    #[test]
    fn test_merge_discount_and_union() {
        let store = store();
        let config = ContextConfig::default();
        // "bar" matches lexically in b.ts (score 1.0), then symbol 0.8 * 0.8
        let ranked = RelevanceRanker::new(&store, &config).rank(&terms(&store, "bar", &[]), None);

        assert_eq!(ranked.len(), 1);
        let b = &ranked[0];
        assert_eq!(b.file.path, "b.ts");
        assert!((b.score - 1.0).abs() < 1e-9);
        assert!((b.evidence - 1.8).abs() < 1e-9);
        assert_eq!(
            b.reasons,
            BTreeSet::from([RelevanceReason::KeywordMatch, RelevanceReason::SymbolDefinition])
        );
    }

    #[test]
    fn test_symbol_reasons_are_unioned() {
        let store = store();
        let config = ContextConfig::default();
        // b.ts defines bar and imports foo
        let ranked =
            RelevanceRanker::new(&store, &config).rank(&terms(&store, "", &["foo", "bar"]), None);

        assert_eq!(paths(&ranked), vec!["b.ts", "a.ts"]);
        let b = &ranked[0];
        assert_eq!(
            b.reasons,
            BTreeSet::from([RelevanceReason::SymbolDefinition, RelevanceReason::SymbolUsage])
        );
        assert!((b.score - 1.0).abs() < 1e-9);
        assert_eq!(b.strategy, RankingStrategy::Symbol);
    }

    #[test]
    fn test_dependency_scores() {
        let store = store();
        let config = ContextConfig::default();
        let ranker = RelevanceRanker::new(&store, &config);

        let from_b = ranker.rank(&QueryTerms::default(), Some("b.ts"));
        assert_eq!(paths(&from_b), vec!["a.ts"]);
        assert!((from_b[0].score - 0.8).abs() < 1e-9);

        let from_a = ranker.rank(&QueryTerms::default(), Some("a.ts"));
        assert_eq!(paths(&from_a), vec!["b.ts"]);
        assert!((from_a[0].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_second_degree_toggle() {
        let mut store = store();
        store.upsert(record_from_source("d.ts", "import { bar } from './b';\n"));
        store.rebuild_graph();

        let config = ContextConfig::default();
        let ranked = RelevanceRanker::new(&store, &config).rank(&QueryTerms::default(), Some("a.ts"));
        assert_eq!(paths(&ranked), vec!["b.ts", "d.ts"]);
        assert!((ranked[1].score - DEPENDENCY_BASE).abs() < 1e-9);

        let config = ContextConfig {
            include_second_degree: false,
            ..ContextConfig::default()
        };
        let ranked = RelevanceRanker::new(&store, &config).rank(&QueryTerms::default(), Some("a.ts"));
        assert_eq!(paths(&ranked), vec!["b.ts"]);
    }

    #[test]
    fn test_symbol_scores_accumulate_and_cap() {
        let store = store();
        let config = ContextConfig::default();
        let ranker = RelevanceRanker::new(&store, &config);
        let terms = QueryTerms {
            symbols: vec!["foo".to_string(), "bar".to_string()],
            ..QueryTerms::default()
        };
        let ranked = ranker.rank(&terms, None);
        let b = ranked.iter().find(|c| c.file.path == "b.ts").unwrap();
        // defines bar (0.8) and imports foo (0.4)
        assert!((b.score - 1.0).abs() < 1e-9);
        let a = ranked.iter().find(|c| c.file.path == "a.ts").unwrap();
        assert!((a.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_recency_fallback_only_when_empty() {
        let mut store = store();
        let mut newest = record_from_source("z.ts", "export const z = 1;\n");
        newest.modified = Utc::now() + Duration::hours(1);
        store.upsert(newest);

        let config = ContextConfig {
            recency_fallback_count: 2,
            ..ContextConfig::default()
        };
        let ranker = RelevanceRanker::new(&store, &config);

        let ranked = ranker.rank(&terms(&store, "nothing matches here", &[]), None);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].file.path, "z.ts");
        assert!(ranked.iter().all(|c| c.strategy == RankingStrategy::Recency));
        assert!(ranked
            .iter()
            .all(|c| c.reasons.contains(&RelevanceReason::RecencyFallback)));
        assert!((ranked[0].score - 0.3).abs() < 1e-9);

        let ranked = ranker.rank(&terms(&store, "foo", &[]), None);
        assert!(ranked.iter().all(|c| c.strategy != RankingStrategy::Recency));
    }

    #[test]
    fn test_current_file_excluded() {
        let store = store();
        let config = ContextConfig::default();
        let ranked = RelevanceRanker::new(&store, &config).rank(&terms(&store, "foo", &[]), Some("a.ts"));
        assert!(!paths(&ranked).contains(&"a.ts"));
    }
}
