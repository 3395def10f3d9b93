/// Brute-force in-process vector index.
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{Embedder, EmbedderError, VectorIndex};
use crate::store::models::FileRecord;

/// Characters of file content folded into a file's embedding text.
const CONTENT_PREFIX_CHARS: usize = 2000;

/// Cosine-similarity index over unit vectors keyed by relative path.
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: RwLock<BTreeMap<String, Vec<f32>>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Embeds every record and indexes it under its path.
    pub fn from_records<'a>(
        embedder: &dyn Embedder,
        records: impl IntoIterator<Item = &'a FileRecord>,
    ) -> Result<Self, EmbedderError> {
        let index = Self::new(embedder.dimensions());
        for record in records {
            index.insert(&record.path, embedder.embed(&document_text(record))?)?;
        }
        Ok(index)
    }

    pub fn insert(&self, id: &str, vector: Vec<f32>) -> Result<(), EmbedderError> {
        if vector.len() != self.dimensions {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.entries
            .write()
            .map_err(|e| EmbedderError::Unavailable(e.to_string()))?
            .insert(id.to_string(), vector);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<bool, EmbedderError> {
        Ok(self
            .entries
            .write()
            .map_err(|e| EmbedderError::Unavailable(e.to_string()))?
            .remove(id)
            .is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, EmbedderError> {
        if vector.len() != self.dimensions {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        let entries = self
            .entries
            .read()
            .map_err(|e| EmbedderError::Unavailable(e.to_string()))?;

        let mut scored: Vec<(String, f32)> = entries
            .iter()
            .map(|(id, v)| (id.clone(), cosine(vector, v)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Text a file is embedded from: its path, symbol names and leading content.
pub fn document_text(record: &FileRecord) -> String {
    let mut text = record.path.replace(['/', '.', '_', '-'], " ");
    for symbol in &record.symbols {
        text.push(' ');
        text.push_str(&symbol.name);
    }
    let mut budget = CONTENT_PREFIX_CHARS;
    for chunk in &record.chunks {
        if budget == 0 {
            break;
        }
        text.push('\n');
        text.extend(chunk.content.chars().take(budget));
        budget = budget.saturating_sub(chunk.content.chars().count());
    }
    text
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::store::documents::tests::record_from_source;

    #[test]
    fn test_nearest_neighbors_order() {
        let index = InMemoryVectorIndex::new(2);
        index.insert("x.ts", vec![1.0, 0.0]).unwrap();
        index.insert("diag.ts", vec![0.7, 0.7]).unwrap();
        index.insert("y.ts", vec![0.0, 1.0]).unwrap();

        let hits = index.nearest_neighbors(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "x.ts");
        assert_eq!(hits[1].0, "diag.ts");
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = InMemoryVectorIndex::new(3);
        assert!(matches!(
            index.insert("a", vec![1.0]),
            Err(EmbedderError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
        assert!(index.nearest_neighbors(&[1.0], 1).is_err());
    }

    #[test]
    fn test_from_records() {
        let embedder = MockEmbedder::new(256);
        let records = [
            record_from_source("auth/session.ts", "export function refreshSession() {}\n"),
            record_from_source("ui/chart.ts", "export function drawChart() {}\n"),
        ];
        let index = InMemoryVectorIndex::from_records(&embedder, &records).unwrap();
        assert_eq!(index.len(), 2);

        let query = embedder.embed("session refresh auth").unwrap();
        let hits = index.nearest_neighbors(&query, 1).unwrap();
        assert_eq!(hits[0].0, "auth/session.ts");

        assert!(index.remove("ui/chart.ts").unwrap());
        assert_eq!(index.len(), 1);
    }
}
