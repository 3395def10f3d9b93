//! Query-time context selection: rank candidate files, then fill a token
//! budget from the best of them.
//!
//! Both stages are pure reads over an [`IndexStore`] snapshot.

pub mod assembler;
pub mod ranker;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::IndexStore;

pub use assembler::{ContextAssembler, ContextSelection};
pub use ranker::{RelevanceCandidate, RelevanceRanker};

/// Words dropped from queries before lexical matching.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "these", "those", "into", "onto", "are",
    "was", "were", "been", "being", "have", "has", "had", "does", "did", "not", "but", "can",
    "could", "should", "would", "will", "shall", "may", "might", "must", "you", "your", "our",
    "its", "their", "them", "they", "what", "which", "who", "whom", "when", "where", "why", "how",
    "all", "any", "each", "some", "such", "than", "then", "too", "very", "just", "also", "only",
    "own", "same", "both", "more", "most", "other", "about", "above", "below", "over", "under",
    "again", "once", "here", "there", "out", "off", "use", "using", "make", "add", "get", "set",
    "please", "want", "need", "like",
];

/// What the caller wants context for.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextRequest {
    /// File being edited, relative to the workspace root or absolute.
    #[serde(default)]
    pub current_file: Option<String>,
    /// Free-text description of the intent.
    #[serde(default)]
    pub query: Option<String>,
    /// Symbol names the caller cares about.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Total token budget, response buffer included.
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// A request reduced to what the ranker and assembler match on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTerms {
    pub query: String,
    /// Lower-cased query keywords.
    pub keywords: Vec<String>,
    /// Requested symbols plus query words that name a defined symbol.
    /// Query words match symbol names exactly, case included: `Foo` does
    /// not pick up `foo`. Keywords still match case-insensitively.
    pub symbols: Vec<String>,
}

impl QueryTerms {
    pub fn new(request: &ContextRequest, store: &IndexStore) -> Self {
        let query = request.query.clone().unwrap_or_default();
        let keywords = tokenize(&query);

        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        let requested = request.symbols.iter().map(|s| s.trim().to_string());
        let implicit = identifiers(&query)
            .filter(|word| store.is_defined(word))
            .map(str::to_string);
        for name in requested.chain(implicit) {
            if !name.is_empty() && seen.insert(name.clone()) {
                symbols.push(name);
            }
        }

        Self {
            query,
            keywords,
            symbols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.symbols.is_empty()
    }
}

/// Lower-cases, strips punctuation and stop words, drops tokens of two
/// characters or fewer, and deduplicates in first-seen order.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 2)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .filter(|w| !w.is_empty())
}
