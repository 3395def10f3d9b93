/// Optional semantic-similarity collaborator.
///
/// The ranker only talks to [`SemanticSearch`]; when none is configured, or
/// when a call fails, ranking proceeds with the lexical, dependency and symbol
/// strategies alone.
pub mod memory;
pub mod mock;

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during embedding or similarity lookup.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("similarity service unavailable: {0}")]
    Unavailable(String),

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Nearest-neighbour lookup over file vectors keyed by relative path.
pub trait VectorIndex: Send + Sync {
    /// Up to `k` `(path, similarity)` pairs, most similar first.
    fn nearest_neighbors(&self, vector: &[f32], k: usize)
    -> Result<Vec<(String, f32)>, EmbedderError>;
}

/// An embedder paired with the index its vectors are compared against.
#[derive(Clone)]
pub struct SemanticSearch {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl SemanticSearch {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Files most similar to `query`.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>, EmbedderError> {
        let vector = self.embedder.embed(query)?;
        if vector.len() != self.embedder.dimensions() {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: vector.len(),
            });
        }
        self.index.nearest_neighbors(&vector, k)
    }
}
