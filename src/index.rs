use rayon::prelude::*;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::config::Number;
use crate::vector_ops::cosine_similarity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<Number>,
}

impl EmbeddingRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, vector: Vec<Number>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            vector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord<'a> {
    pub record: &'a EmbeddingRecord,
    pub similarity: Number,
}

/// Exact nearest-neighbour index over an in-memory record set.
///
/// Queries take `&self` and never mutate, so one index can be shared by any
/// number of concurrent readers once it has been populated.
#[derive(Debug, Default)]
pub struct VectorIndex {
    records: Vec<EmbeddingRecord>,
}

// Heap entry. Greater means a better match: higher similarity, then earlier
// insertion.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    similarity: Number,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .partial_cmp(&other.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<EmbeddingRecord>) -> Self {
        let mut index = Self::new();
        index.index(records);
        index
    }

    /// Replaces the whole record set.
    pub fn index(&mut self, records: Vec<EmbeddingRecord>) {
        tracing::debug!(records = records.len(), "replacing index contents");
        self.records = records;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the `min(k, len)` records most similar to `vector`, best first.
    /// Equal scores keep insertion order.
    pub fn query(&self, vector: &[Number], k: usize) -> Vec<ScoredRecord<'_>> {
        let k = k.min(self.records.len());
        if k == 0 {
            return Vec::new();
        }

        let scores: Vec<Number> = self
            .records
            .par_iter()
            .map(|record| cosine_similarity(vector, &record.vector))
            .collect();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (position, similarity) in scores.into_iter().enumerate() {
            heap.push(Reverse(Candidate {
                similarity,
                position,
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|Reverse(candidate)| ScoredRecord {
                record: &self.records[candidate.position],
                similarity: candidate.similarity,
            })
            .collect()
    }
}
