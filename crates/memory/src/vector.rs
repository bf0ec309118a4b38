//! Vector similarity and the document index behind the knowledge store.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - A linear-scan index that keeps documents in insertion order

use crate::knowledge::{Document, SearchHit};
use std::collections::{BTreeMap, HashMap};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is empty, zero-norm, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Storage and nearest-neighbour lookup for embedded documents.
///
/// Implementations must keep a stable iteration order (insertion order) so
/// that equal similarities rank deterministically.
pub trait VectorIndex: Send + Sync {
    /// Insert a document, or replace the one with the same id in place.
    fn upsert(&mut self, document: Document);

    fn remove(&mut self, id: &str) -> Option<Document>;

    fn get(&self, id: &str) -> Option<&Document>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in insertion order.
    fn documents(&self) -> Vec<&Document>;

    /// Top `limit` documents by cosine similarity to `query`, highest first.
    fn nearest(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, &Document)> = self
            .documents()
            .into_iter()
            .map(|doc| (cosine_similarity(&doc.embedding, query), doc))
            .collect();

        // sort_by is stable: ties keep insertion order. NaN ranks last.
        let rank = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
        scored.sort_by(|a, b| rank(b.0).total_cmp(&rank(a.0)));
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(similarity, doc)| SearchHit::from_document(doc, similarity))
            .collect()
    }
}

/// Exhaustive O(n) index. Fine for a corpus of a few hundred documents.
#[derive(Debug, Default)]
pub struct LinearIndex {
    by_seq: BTreeMap<u64, Document>,
    seq_of: HashMap<String, u64>,
    next_seq: u64,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for LinearIndex {
    fn upsert(&mut self, document: Document) {
        if let Some(seq) = self.seq_of.get(&document.id) {
            self.by_seq.insert(*seq, document);
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_of.insert(document.id.clone(), seq);
        self.by_seq.insert(seq, document);
    }

    fn remove(&mut self, id: &str) -> Option<Document> {
        let seq = self.seq_of.remove(id)?;
        self.by_seq.remove(&seq)
    }

    fn get(&self, id: &str) -> Option<&Document> {
        self.seq_of.get(id).and_then(|seq| self.by_seq.get(seq))
    }

    fn len(&self) -> usize {
        self.by_seq.len()
    }

    fn documents(&self) -> Vec<&Document> {
        self.by_seq.values().collect()
    }
}
