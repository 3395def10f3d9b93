/// End-to-end integration tests for the codectx pipeline.
///
/// Tests the complete flow:
///   Config → Engine → Index → Symbol lookup / Graph / Ranking → Context
use codectx::config::Config;
use codectx::context::ContextRequest;
use codectx::context::assembler::Provenance;
use codectx::context::ranker::RelevanceReason;
use codectx::embedder::memory::{InMemoryVectorIndex, document_text};
use codectx::embedder::mock::MockEmbedder;
use codectx::embedder::{Embedder, EmbedderError, SemanticSearch, VectorIndex};
use codectx::engine::ContextEngine;
use codectx::error::EngineError;
use codectx::events::IndexEvent;
use codectx::store::graph::resolve_import;
use codectx::store::models::IndexStatus;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// `a.ts` exports `foo`, `b.ts` imports it and defines `bar`, `c.ts` stands alone.
fn three_file_workspace(root: &Path) {
    write(root, "a.ts", "export function foo() {\n  return 1;\n}\n");
    write(
        root,
        "b.ts",
        "import { foo } from './a';\n\nexport function bar() {\n  return foo() + 1;\n}\n",
    );
    write(
        root,
        "c.ts",
        "export const unrelated = 42;\nexport function widget() {}\n",
    );
}

fn query(q: &str) -> ContextRequest {
    ContextRequest {
        query: Some(q.to_string()),
        ..ContextRequest::default()
    }
}

/// Full pipeline: index three files, look up symbols, inspect the graph.
#[tokio::test]
async fn test_symbol_lookup_and_single_edge() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    let summary = engine.index_workspace(dir.path(), None).await.unwrap();
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.failed, 0);

    let foo = engine.find_symbol("foo").await;
    assert_eq!(foo.len(), 1);
    assert_eq!(foo[0].path, "a.ts");
    assert_eq!(foo[0].line, 1);

    let refs = engine.find_references("foo").await;
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].path, "b.ts");

    let store = engine.store();
    let store = store.read().await;
    let graph = store.graph();
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.has_edge("b.ts", "a.ts"));
    assert!(!graph.has_edge("a.ts", "b.ts"));
}

#[tokio::test]
async fn test_ranking_prefers_definer() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    let ranked = engine.find_relevant_files(&query("foo")).await;
    let paths: Vec<&str> = ranked.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a.ts", "b.ts"]);
    assert!(ranked[0].reasons.contains(&RelevanceReason::SymbolDefinition));
    assert!(ranked[1].reasons.contains(&RelevanceReason::SymbolUsage));
}

#[tokio::test]
async fn test_merged_candidates_appear_once() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    // a.ts matches lexically, as a dependency of b.ts and as the definer of foo
    let request = ContextRequest {
        current_file: Some("b.ts".to_string()),
        query: Some("foo".to_string()),
        ..ContextRequest::default()
    };
    let ranked = engine.find_relevant_files(&request).await;

    let a: Vec<_> = ranked.iter().filter(|r| r.path == "a.ts").collect();
    assert_eq!(a.len(), 1);
    assert!(a[0].reasons.contains(&RelevanceReason::KeywordMatch));
    assert!(a[0].reasons.contains(&RelevanceReason::DependencyRelationship));
    assert!(a[0].reasons.contains(&RelevanceReason::SymbolDefinition));
    assert!(ranked.iter().all(|r| r.path != "b.ts"));
}

#[tokio::test]
async fn test_current_file_slice_under_tight_budget() {
    let dir = tempdir().unwrap();
    // 16 lines of 18 chars, cut into two-line chunks of 10 tokens
    let content = (0..16)
        .map(|i| format!("let value_{i:02} = {i:02};"))
        .collect::<Vec<_>>()
        .join("\n");
    write(dir.path(), "big.ts", &content);

    let config = Config {
        chunk_max_tokens: 10,
        ..Config::default()
    };
    let engine = ContextEngine::new(config).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    let request = ContextRequest {
        current_file: Some("big.ts".to_string()),
        max_tokens: Some(50),
        ..ContextRequest::default()
    };
    let selection = engine.build_context(&request).await;

    assert_eq!(selection.reserved_tokens, 5);
    assert_eq!(selection.available_tokens, 45);
    assert!(!selection.chunks.is_empty());
    assert!(!selection.budget_unsatisfiable);

    let current_tokens: usize = selection
        .chunks
        .iter()
        .filter(|c| c.provenance == Provenance::CurrentFile)
        .map(|c| c.tokens)
        .sum();
    assert!(current_tokens > 0);
    assert!(current_tokens <= 18);

    let total: usize = selection.chunks.iter().map(|c| c.tokens).sum();
    assert_eq!(total, selection.total_tokens);
    assert!(total <= 45);
}

#[tokio::test]
async fn test_small_current_file_included_whole() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    let request = ContextRequest {
        current_file: Some("b.ts".to_string()),
        ..ContextRequest::default()
    };
    let selection = engine.build_context(&request).await;

    let store = engine.store();
    let store = store.read().await;
    let b = store.get("b.ts").unwrap();
    let current: Vec<_> = selection
        .chunks
        .iter()
        .filter(|c| c.provenance == Provenance::CurrentFile)
        .collect();
    assert_eq!(current.len(), b.chunks.len());
    assert!(current.iter().all(|c| c.path == "b.ts"));
    // The imported file follows as a dependency
    assert!(selection.files.iter().any(|f| f.path == "a.ts"));
}

#[tokio::test]
async fn test_budget_never_exceeded() {
    let dir = tempdir().unwrap();
    for i in 0..12 {
        let body = (0..30)
            .map(|n| format!("  const step{n} = handler{i}(input, {n});"))
            .collect::<Vec<_>>()
            .join("\n");
        write(
            dir.path(),
            &format!("src/handler{i}.ts"),
            &format!("import {{ shared }} from './shared';\n\nexport function handler{i}(input: string) {{\n{body}\n  return shared(input);\n}}\n"),
        );
    }
    write(
        dir.path(),
        "src/shared.ts",
        "export function shared(input: string) {\n  return input.trim();\n}\n",
    );

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    for max_tokens in [20, 100, 400, 1_000, 8_000] {
        let request = ContextRequest {
            current_file: Some("src/handler0.ts".to_string()),
            query: Some("shared input handler".to_string()),
            symbols: vec!["shared".to_string()],
            max_tokens: Some(max_tokens),
        };
        let selection = engine.build_context(&request).await;
        let total: usize = selection.chunks.iter().map(|c| c.tokens).sum();
        assert!(
            total <= selection.available_tokens,
            "budget {max_tokens}: {total} > {}",
            selection.available_tokens
        );
        assert!(selection.files.len() <= engine.config().context.max_files);
    }
}

#[tokio::test]
async fn test_update_drops_stale_symbol() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();
    assert_eq!(engine.find_symbol("foo").await.len(), 1);

    write(dir.path(), "a.ts", "export function renamed() {\n  return 1;\n}\n");
    engine.update_file("a.ts").await.unwrap();

    assert!(engine.find_symbol("foo").await.is_empty());
    assert_eq!(engine.find_symbol("renamed").await.len(), 1);
    // b.ts still imports the name
    let refs = engine.find_references("foo").await;
    assert!(refs.iter().all(|r| r.path != "a.ts"));
}

#[tokio::test]
async fn test_oversized_file_skipped_silently() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());
    let line = "export const filler = 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx';\n";
    let big = line.repeat(150 * 1024 / line.len() + 1);
    assert!(big.len() > 150 * 1024);
    write(dir.path(), "huge.ts", &big);

    let engine = ContextEngine::new(Config::default()).unwrap();
    let mut events = engine.subscribe();
    let summary = engine.index_workspace(dir.path(), None).await.unwrap();

    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let store = engine.store();
    let store = store.read().await;
    assert!(!store.contains("huge.ts"));
    assert!(store.graph().node("huge.ts").is_none());
    drop(store);

    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, IndexEvent::Error { .. }));
    }
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();
    let first = engine.store().read().await.get("b.ts").cloned().unwrap();

    engine.index_workspace(dir.path(), None).await.unwrap();
    let second = engine.store().read().await.get("b.ts").cloned().unwrap();
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.chunks, second.chunks);

    engine.update_file("b.ts").await.unwrap();
    let third = engine.store().read().await.get("b.ts").cloned().unwrap();
    assert_eq!(first.symbols, third.symbols);
    assert_eq!(first.chunks, third.chunks);
    assert_eq!(engine.find_symbol("bar").await.len(), 1);
}

#[tokio::test]
async fn test_every_edge_resolves_from_an_import() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "web/src/app.ts",
        "import { api } from './lib/api';\nimport { fmt } from './lib';\nimport React from 'react';\n",
    );
    write(dir.path(), "web/src/lib/api.ts", "export const api = 1;\n");
    write(dir.path(), "web/src/lib/index.ts", "export const fmt = 2;\n");
    write(
        dir.path(),
        "py/pkg/main.py",
        "from .util import helper\nimport os\n",
    );
    write(dir.path(), "py/pkg/util.py", "def helper():\n    pass\n");
    write(dir.path(), "rs/src/lib.rs", "mod parse;\nuse crate::parse::Token;\n");
    write(dir.path(), "rs/src/parse.rs", "pub struct Token;\n");

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    let store = engine.store();
    let store = store.read().await;
    let files: std::collections::BTreeMap<String, ()> = store
        .records()
        .map(|r| (r.path.clone(), ()))
        .collect();

    let graph = store.graph();
    assert!(graph.has_edge("web/src/app.ts", "web/src/lib/api.ts"));
    assert!(graph.has_edge("web/src/app.ts", "web/src/lib/index.ts"));
    assert!(graph.has_edge("py/pkg/main.py", "py/pkg/util.py"));
    assert!(graph.has_edge("rs/src/lib.rs", "rs/src/parse.rs"));

    for edge in graph.edges() {
        let importer = store.get(&edge.from).unwrap();
        assert!(
            importer
                .imports
                .iter()
                .any(|spec| resolve_import(spec, &edge.from, &files).as_deref()
                    == Some(edge.to.as_str())),
            "edge {} -> {} has no matching import",
            edge.from,
            edge.to
        );
    }
}

#[tokio::test]
async fn test_remove_file_prunes_graph() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    assert!(engine.remove_file("a.ts").await.unwrap());
    assert!(!engine.remove_file("a.ts").await.unwrap());
    assert!(engine.find_symbol("foo").await.is_empty());
    assert_eq!(engine.store().read().await.graph().edge_count(), 0);

    let related = engine.get_related_files("b.ts", 10).await;
    assert!(related.is_empty());
}

#[tokio::test]
async fn test_missing_root_fails_and_sets_error_status() {
    let dir = tempdir().unwrap();
    let engine = ContextEngine::new(Config::default()).unwrap();

    let err = engine
        .index_workspace(dir.path().join("missing"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkspaceAccess { .. }));

    let status = engine.get_index_status().await;
    assert_eq!(status.status, IndexStatus::Error);
    assert!(status.last_error.is_some());


    let fresh = ContextEngine::new(Config::default()).unwrap();
    assert!(matches!(
        fresh.update_file("a.ts").await,
        Err(EngineError::NoWorkspace)
    ));
}

#[tokio::test]
async fn test_search_and_related_files() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let engine = ContextEngine::new(Config::default()).unwrap();
    engine.index_workspace(dir.path(), None).await.unwrap();

    let hits = engine
        .search_files("WIDGET", Default::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "c.ts");

    let options = codectx::store::search::SearchOptions {
        case_sensitive: false,
        regex: true,
    };
    assert!(matches!(
        engine.search_files("fn(", options).await,
        Err(EngineError::InvalidPattern(_))
    ));

    let related: Vec<String> = engine
        .get_related_files("a.ts", 10)
        .await
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(related, vec!["b.ts".to_string()]);
}

// ── Semantic similarity ──────────────────────────────────────────────

struct OfflineIndex;

impl VectorIndex for OfflineIndex {
    fn nearest_neighbors(
        &self,
        _vector: &[f32],
        _k: usize,
    ) -> Result<Vec<(String, f32)>, EmbedderError> {
        Err(EmbedderError::Unavailable("index offline".to_string()))
    }
}

#[tokio::test]
async fn test_semantic_failure_degrades_to_other_strategies() {
    let dir = tempdir().unwrap();
    three_file_workspace(dir.path());

    let plain = ContextEngine::new(Config::default()).unwrap();
    plain.index_workspace(dir.path(), None).await.unwrap();

    let semantic = SemanticSearch::new(Arc::new(MockEmbedder::default()), Arc::new(OfflineIndex));
    let degraded = ContextEngine::new(Config::default())
        .unwrap()
        .with_semantic_search(semantic);
    degraded.index_workspace(dir.path(), None).await.unwrap();

    let expected: Vec<String> = plain
        .find_relevant_files(&query("foo"))
        .await
        .into_iter()
        .map(|r| r.path)
        .collect();
    let actual: Vec<String> = degraded
        .find_relevant_files(&query("foo"))
        .await
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(actual, expected);

    let selection = degraded.build_context(&query("foo")).await;
    assert!(!selection.files.is_empty());
}

#[tokio::test]
async fn test_semantic_similarity_contributes() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "auth.ts",
        "export function refreshSession(sessionToken: string) {\n  return sessionToken;\n}\n",
    );
    write(dir.path(), "math.ts", "export function add(a: number, b: number) {\n  return a + b;\n}\n");

    let embedder = Arc::new(MockEmbedder::default());
    let index = Arc::new(InMemoryVectorIndex::new(embedder.dimensions()));
    let engine = ContextEngine::new(Config::default())
        .unwrap()
        .with_semantic_search(SemanticSearch::new(embedder.clone(), index.clone()));
    engine.index_workspace(dir.path(), None).await.unwrap();

    {
        let store = engine.store();
        let store = store.read().await;
        for record in store.records() {
            index
                .insert(&record.path, embedder.embed(&document_text(record)).unwrap())
                .unwrap();
        }
    }
    assert_eq!(index.len(), 2);

    let ranked = engine
        .find_relevant_files(&query("refreshSession sessionToken"))
        .await;
    assert_eq!(ranked[0].path, "auth.ts");
    assert!(ranked[0].reasons.contains(&RelevanceReason::SemanticSimilarity));
}

#[tokio::test]
async fn test_empty_index_yields_empty_selection() {
    let engine = ContextEngine::new(Config::default()).unwrap();
    let selection = engine.build_context(&query("anything at all")).await;
    assert!(selection.files.is_empty());
    assert!(selection.chunks.is_empty());
    assert_eq!(selection.total_tokens, 0);
}
