//! In-memory vector index using cosine similarity

use super::{IndexConnector, ScoredRecord, VectorIndex, VectorRecord};
use async_trait::async_trait;
use ragforge_common::errors::Result;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Vector index held in process memory
///
/// Records keep insertion order; an upsert with an existing id replaces the
/// record in place. Ties in similarity keep insertion order.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let written = records.len();
        let mut store = self.records.write().await;
        for record in records {
            match store.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => store.push(record),
            }
        }
        Ok(written)
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let store = self.records.read().await;

        let mut scored: Vec<ScoredRecord> = store
            .iter()
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                score: cosine_similarity(&record.embedding, query),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Connector handing out one shared in-memory index
///
/// Stands in for pgvector in offline runs and tests; counts connects.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    index: Arc<InMemoryIndex>,
    connects: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index every successful connect returns
    pub fn index(&self) -> Arc<InMemoryIndex> {
        self.index.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl IndexConnector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn VectorIndex>> {
        self.connects.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.index.clone())
    }
}
