use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::QueryTerms;
use super::ranker::{RelevanceCandidate, RelevanceReason};
use crate::config::ContextConfig;
use crate::store::models::{ChunkType, FileRecord, SemanticChunk, Symbol};

// Guards float products like 50 * 0.9 from landing a hair off an integer.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    CurrentFile,
    WholeFile,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    Whole,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Every included file fit whole.
    WholeFile,
    /// At least one file was cut down to its best chunks.
    ChunkBased,
}

/// A file that contributed content to the selection.
#[derive(Debug, Clone, Serialize)]
pub struct IncludedFile {
    pub path: String,
    pub language: String,
    pub relevance: f64,
    pub inclusion: Inclusion,
    pub reasons: Vec<RelevanceReason>,
    /// Tokens of this file actually included.
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    pub path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_type: ChunkType,
    pub tokens: usize,
    pub relevance: f64,
    pub provenance: Provenance,
}

/// Budgeted context handed to the downstream consumer.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSelection {
    pub files: Vec<IncludedFile>,
    pub chunks: Vec<ContextChunk>,
    pub imports: Vec<String>,
    pub symbols: Vec<Symbol>,
    pub total_tokens: usize,
    /// Budget after the response reserve.
    pub available_tokens: usize,
    pub reserved_tokens: usize,
    pub strategy: SelectionStrategy,
    pub average_relevance: f64,
    /// Set when the current file could not contribute anything.
    pub budget_unsatisfiable: bool,
}

/// Greedy, budget-aware selection of files and chunks.
pub struct ContextAssembler<'a> {
    config: &'a ContextConfig,
}

/// Selection state while filling the budget.
struct Draft<'c> {
    config: &'c ContextConfig,
    available: usize,
    used: usize,
    files: Vec<IncludedFile>,
    chunks: Vec<ContextChunk>,
    included: HashSet<String>,
    imports: Vec<String>,
    seen_imports: HashSet<String>,
    symbols: Vec<Symbol>,
    partial: bool,
}

impl<'c> Draft<'c> {
    fn remaining(&self) -> usize {
        self.available.saturating_sub(self.used)
    }

    fn is_saturated(&self) -> bool {
        self.used as f64 + EPSILON >= self.available as f64 * self.config.stop_threshold
    }

    fn add_file(
        &mut self,
        file: &FileRecord,
        relevance: f64,
        inclusion: Inclusion,
        reasons: Vec<RelevanceReason>,
        chunks: Vec<ContextChunk>,
    ) {
        let tokens: usize = chunks.iter().map(|c| c.tokens).sum();
        self.used += tokens;
        self.chunks.extend(chunks);
        self.included.insert(file.path.clone());
        self.files.push(IncludedFile {
            path: file.path.clone(),
            language: file.language.clone(),
            relevance,
            inclusion,
            reasons,
            tokens,
        });

        for import in &file.imports {
            if self.seen_imports.insert(import.clone()) {
                self.imports.push(import.clone());
            }
        }
        let room = self.config.max_symbols.saturating_sub(self.symbols.len());
        self.symbols
            .extend(file.symbols.iter().take(room).cloned());
    }
}

impl<'a> ContextAssembler<'a> {
    pub fn new(config: &'a ContextConfig) -> Self {
        Self { config }
    }

    /// Tokens held back from `max_tokens` for the response.
    pub fn reserved_tokens(&self, max_tokens: usize) -> usize {
        let reserved = (max_tokens as f64 * self.config.response_buffer - EPSILON).ceil();
        (reserved.max(0.0) as usize).min(max_tokens)
    }

    /// Fills `max_tokens` (minus the response reserve) from `current` and the
    /// ranked `candidates`.
    ///
    /// The current file comes first: whole when it fits its share of the
    /// budget, otherwise its best chunks up to that share. Candidates follow
    /// in rank order, whole when they fit and chunk by chunk when they do not,
    /// until usage reaches the stop threshold or the file cap.
    pub fn select(
        &self,
        terms: &QueryTerms,
        current: Option<&FileRecord>,
        candidates: &[RelevanceCandidate<'_>],
        max_tokens: usize,
    ) -> ContextSelection {
        let reserved = self.reserved_tokens(max_tokens);
        let available = max_tokens - reserved;
        let mut draft = Draft {
            config: self.config,
            available,
            used: 0,
            files: Vec::new(),
            chunks: Vec::new(),
            included: HashSet::new(),
            imports: Vec::new(),
            seen_imports: HashSet::new(),
            symbols: Vec::new(),
            partial: false,
        };
        let mut budget_unsatisfiable = false;

        if let Some(file) = current {
            let cap = floor_share(available, self.config.current_file_share);
            if file.total_tokens() <= cap {
                let chunks = file
                    .chunks
                    .iter()
                    .map(|c| context_chunk(file, c, 1.0, Provenance::CurrentFile))
                    .collect();
                draft.add_file(file, 1.0, Inclusion::Whole, Vec::new(), chunks);
            } else {
                let chunks = best_chunks(file, terms, cap, Provenance::CurrentFile);
                if chunks.is_empty() {
                    budget_unsatisfiable = true;
                } else {
                    draft.partial = true;
                    draft.add_file(file, 1.0, Inclusion::Partial, Vec::new(), chunks);
                }
            }
        }

        for candidate in candidates {
            if draft.is_saturated() || draft.files.len() >= self.config.max_files {
                break;
            }
            let file = candidate.file;
            if draft.included.contains(&file.path) {
                continue;
            }
            let reasons: Vec<RelevanceReason> = candidate.reasons.iter().copied().collect();
            let remaining = draft.remaining();

            if file.total_tokens() <= remaining {
                let mut chunks: Vec<ContextChunk> = file
                    .chunks
                    .iter()
                    .map(|c| {
                        context_chunk(file, c, chunk_score(c, terms), Provenance::WholeFile)
                    })
                    .collect();
                chunks.sort_by_key(|c| c.start_line);
                draft.add_file(file, candidate.score, Inclusion::Whole, reasons, chunks);
            } else if remaining > 0 {
                let chunks = best_chunks(file, terms, remaining, Provenance::Partial);
                if !chunks.is_empty() {
                    draft.partial = true;
                    draft.add_file(file, candidate.score, Inclusion::Partial, reasons, chunks);
                }
            }
        }

        let average_relevance = if draft.files.is_empty() {
            0.0
        } else {
            draft.files.iter().map(|f| f.relevance).sum::<f64>() / draft.files.len() as f64
        };
        debug!(
            "Selected {} files, {} chunks, {}/{} tokens",
            draft.files.len(),
            draft.chunks.len(),
            draft.used,
            available
        );

        ContextSelection {
            total_tokens: draft.used,
            available_tokens: available,
            reserved_tokens: reserved,
            strategy: if draft.partial {
                SelectionStrategy::ChunkBased
            } else {
                SelectionStrategy::WholeFile
            },
            average_relevance,
            budget_unsatisfiable,
            files: draft.files,
            chunks: draft.chunks,
            imports: draft.imports,
            symbols: draft.symbols,
        }
    }
}

/// Relevance of one chunk for the query, in `[0, 1]`.
pub fn chunk_score(chunk: &SemanticChunk, terms: &QueryTerms) -> f64 {
    let mut score = match chunk.chunk_type {
        ChunkType::Class => 0.9,
        ChunkType::Function => 0.8,
        ChunkType::Interface => 0.7,
        ChunkType::General => 0.5,
    };

    let lowered = chunk.content.to_lowercase();
    let keyword_hits = terms
        .keywords
        .iter()
        .filter(|k| lowered.contains(k.as_str()))
        .count();
    score += 0.3 * keyword_hits as f64;

    let symbol_hits = terms
        .symbols
        .iter()
        .filter(|s| chunk.content.contains(s.as_str()))
        .count();
    score += 0.4 * symbol_hits as f64;

    if matches!(chunk.chunk_type, ChunkType::Function | ChunkType::Class) {
        score += 0.2;
    }
    score.min(1.0)
}

/// Highest-scoring chunks that fit in `limit` tokens, in line order.
fn best_chunks(
    file: &FileRecord,
    terms: &QueryTerms,
    limit: usize,
    provenance: Provenance,
) -> Vec<ContextChunk> {
    let mut scored: Vec<(&SemanticChunk, f64)> = file
        .chunks
        .iter()
        .map(|c| (c, chunk_score(c, terms)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then(a.0.start_line.cmp(&b.0.start_line))
    });

    let mut left = limit;
    let mut picked: Vec<ContextChunk> = Vec::new();
    for (chunk, score) in scored {
        if left == 0 {
            break;
        }
        if chunk.tokens <= left {
            left -= chunk.tokens;
            picked.push(context_chunk(file, chunk, score, provenance));
        }
    }
    picked.sort_by_key(|c| c.start_line);
    picked
}

fn context_chunk(
    file: &FileRecord,
    chunk: &SemanticChunk,
    relevance: f64,
    provenance: Provenance,
) -> ContextChunk {
    ContextChunk {
        path: file.path.clone(),
        content: chunk.content.clone(),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        chunk_type: chunk.chunk_type,
        tokens: chunk.tokens,
        relevance,
        provenance,
    }
}

fn floor_share(total: usize, share: f64) -> usize {
    (total as f64 * share + EPSILON).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ranker::RankingStrategy;
    use crate::store::documents::tests::record_from_source;
    use crate::store::models::SemanticChunk;
    use std::collections::BTreeSet;

    fn record_with_chunks(path: &str, chunks: &[(ChunkType, usize)]) -> FileRecord {
        let mut record = record_from_source(path, "");
        let mut line = 1;
        record.chunks = chunks
            .iter()
            .map(|(chunk_type, tokens)| {
                let chunk = SemanticChunk {
                    content: "x".repeat(tokens * 4),
                    start_line: line,
                    end_line: line,
                    chunk_type: *chunk_type,
                    tokens: *tokens,
                };
                line += 1;
                chunk
            })
            .collect();
        record
    }

    fn candidate(file: &FileRecord, score: f64) -> RelevanceCandidate<'_> {
        RelevanceCandidate {
            file,
            score,
            evidence: score,
            reasons: BTreeSet::from([RelevanceReason::KeywordMatch]),
            strategy: RankingStrategy::Lexical,
        }
    }

    #[test]
    fn test_reserve_and_available() {
        let config = ContextConfig::default();
        let assembler = ContextAssembler::new(&config);
        assert_eq!(assembler.reserved_tokens(50), 5);
        assert_eq!(assembler.reserved_tokens(8000), 800);
        assert_eq!(assembler.reserved_tokens(7), 1);
        assert_eq!(assembler.reserved_tokens(0), 0);
    }

    #[test]
    fn test_current_file_slice_when_too_large() {
        let config = ContextConfig::default();
        let current = record_with_chunks(
            "big.ts",
            &[
                (ChunkType::General, 20),
                (ChunkType::Function, 10),
                (ChunkType::Class, 30),
                (ChunkType::General, 8),
                (ChunkType::Interface, 12),
            ],
        );
        assert_eq!(current.total_tokens(), 80);

        let selection = ContextAssembler::new(&config).select(
            &QueryTerms::default(),
            Some(&current),
            &[],
            50,
        );

        assert_eq!(selection.available_tokens, 45);
        assert!(selection.total_tokens <= 18);
        assert!(selection.total_tokens <= selection.available_tokens);
        // the 10-token function outranks the rest that still fit
        assert_eq!(selection.chunks[0].chunk_type, ChunkType::Function);
        assert!(selection.chunks.iter().all(|c| c.provenance == Provenance::CurrentFile));
        assert_eq!(selection.strategy, SelectionStrategy::ChunkBased);
        assert!(!selection.budget_unsatisfiable);
    }

    #[test]
    fn test_current_file_whole_when_it_fits() {
        let config = ContextConfig::default();
        let current = record_with_chunks(
            "small.ts",
            &[(ChunkType::General, 5), (ChunkType::Function, 5)],
        );
        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), Some(&current), &[], 100);

        assert_eq!(selection.chunks.len(), 2);
        assert!(selection
            .chunks
            .iter()
            .all(|c| c.provenance == Provenance::CurrentFile && c.relevance == 1.0));
        assert_eq!(selection.files[0].inclusion, Inclusion::Whole);
        assert_eq!(selection.strategy, SelectionStrategy::WholeFile);
        assert!((selection.average_relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_unsatisfiable_flag() {
        let config = ContextConfig::default();
        let current = record_with_chunks("huge.ts", &[(ChunkType::Class, 500)]);
        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), Some(&current), &[], 100);
        assert!(selection.budget_unsatisfiable);
        assert!(selection.chunks.is_empty());
        assert_eq!(selection.total_tokens, 0);
    }

    #[test]
    fn test_candidates_whole_then_partial() {
        let config = ContextConfig::default();
        let first = record_with_chunks("first.ts", &[(ChunkType::Function, 40)]);
        let second = record_with_chunks(
            "second.ts",
            &[(ChunkType::General, 50), (ChunkType::Class, 20)],
        );
        let candidates = [candidate(&first, 0.9), candidate(&second, 0.6)];

        // 100 total, 90 available: first fits whole, second only partly
        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), None, &candidates, 100);

        assert_eq!(selection.files.len(), 2);
        assert_eq!(selection.files[0].inclusion, Inclusion::Whole);
        assert_eq!(selection.files[1].inclusion, Inclusion::Partial);
        assert_eq!(selection.total_tokens, 60);
        assert_eq!(selection.strategy, SelectionStrategy::ChunkBased);
        assert!((selection.average_relevance - 0.75).abs() < 1e-9);
        let partial: Vec<_> = selection
            .chunks
            .iter()
            .filter(|c| c.provenance == Provenance::Partial)
            .collect();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].chunk_type, ChunkType::Class);
    }

    #[test]
    fn test_stops_at_threshold_and_file_cap() {
        let config = ContextConfig {
            max_files: 2,
            ..ContextConfig::default()
        };
        let files: Vec<FileRecord> = (0..5)
            .map(|i| record_with_chunks(&format!("f{i}.ts"), &[(ChunkType::General, 9)]))
            .collect();
        let candidates: Vec<_> = files.iter().map(|f| candidate(f, 0.5)).collect();

        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), None, &candidates, 1000);
        assert_eq!(selection.files.len(), 2);

        let config = ContextConfig::default();
        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), None, &candidates, 40);
        // 36 available; stops once 90% (32.4) is used
        assert_eq!(selection.files.len(), 4);
        assert_eq!(selection.total_tokens, 36);
        assert!(selection.total_tokens <= selection.available_tokens);
    }

    #[test]
    fn test_merged_imports_and_symbol_cap() {
        let config = ContextConfig {
            max_symbols: 2,
            ..ContextConfig::default()
        };
        let a = record_from_source(
            "a.ts",
            "import { x } from './x';\nexport function one() {}\nexport function two() {}\n",
        );
        let b = record_from_source(
            "b.ts",
            "import { x } from './x';\nimport y from './y';\nexport function three() {}\n",
        );
        let candidates = [candidate(&a, 0.9), candidate(&b, 0.8)];
        let selection =
            ContextAssembler::new(&config).select(&QueryTerms::default(), None, &candidates, 8000);

        assert_eq!(selection.imports, vec!["./x", "./y"]);
        assert_eq!(selection.symbols.len(), 2);
        assert_eq!(selection.symbols[0].name, "one");
    }

    #[test]
    fn test_chunk_score_curve() {
        let chunk = |chunk_type, content: &str| SemanticChunk {
            content: content.to_string(),
            start_line: 1,
            end_line: 1,
            chunk_type,
            tokens: 1,
        };
        let none = QueryTerms::default();
        assert!((chunk_score(&chunk(ChunkType::General, "x"), &none) - 0.5).abs() < 1e-9);
        assert!((chunk_score(&chunk(ChunkType::Interface, "x"), &none) - 0.7).abs() < 1e-9);
        assert!((chunk_score(&chunk(ChunkType::Function, "x"), &none) - 1.0).abs() < 1e-9);

        let terms = QueryTerms {
            keywords: vec!["login".to_string()],
            ..QueryTerms::default()
        };
        assert!((chunk_score(&chunk(ChunkType::General, "Login()"), &terms) - 0.8).abs() < 1e-9);
    }
}
