//! Vector index abstraction
//!
//! Two backends:
//! - pgvector (persistent, shared by every question)
//! - in-memory cosine similarity (ephemeral, one question)

mod memory;
mod pg;

pub use memory::{InMemoryConnector, InMemoryIndex};
pub use pg::{PgVectorConnector, PgVectorIndex};

use async_trait::async_trait;
use ragforge_common::document::{Chunk, Metadata};
use ragforge_common::errors::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored chunk with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Stable content hash, see [`Chunk::record_id`]
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.record_id(),
            embedding,
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}

/// A search hit. The embedding is not read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

impl From<ScoredRecord> for Chunk {
    fn from(record: ScoredRecord) -> Self {
        Chunk {
            content: record.content,
            metadata: record.metadata,
        }
    }
}

/// Common trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id. Returns the number written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Up to `k` records, most similar first
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Opens the persistent index. Called at most once per successful
/// initialization of a [`crate::VectorStoreManager`].
#[async_trait]
pub trait IndexConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn VectorIndex>>;
}
