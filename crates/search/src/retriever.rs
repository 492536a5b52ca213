//! Top-k retrieval over a vector index

use crate::index::{ScoredRecord, VectorIndex};
use ragforge_common::document::Chunk;
use ragforge_common::embeddings::Embedder;
use ragforge_common::errors::Result;
use ragforge_common::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Which index a retriever reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalScope {
    /// The persistent index shared by every question
    Global,
    /// A request-scoped index built from one document
    Ephemeral,
}

impl RetrievalScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalScope::Global => "global",
            RetrievalScope::Ephemeral => "ephemeral",
        }
    }
}

/// Maps a question to its `k` most similar chunks
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
    scope: RetrievalScope,
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("backend", &self.index.backend())
            .field("k", &self.k)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        k: usize,
        scope: RetrievalScope,
    ) -> Self {
        Self {
            index,
            embedder,
            k,
            scope,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn scope(&self) -> RetrievalScope {
        self.scope
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Ranked hits with scores
    pub async fn retrieve_scored(&self, question: &str) -> Result<Vec<ScoredRecord>> {
        let start = Instant::now();

        let query = self.embedder.embed(question).await?;
        let hits = self.index.similarity_search(&query, self.k).await?;

        metrics::record_retrieval(start.elapsed().as_secs_f64(), self.scope.as_str(), hits.len());
        debug!(
            scope = self.scope.as_str(),
            k = self.k,
            hits = hits.len(),
            "Similarity search complete"
        );

        Ok(hits)
    }

    /// Ranked chunks, most similar first, at most `k`
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        let hits = self.retrieve_scored(question).await?;
        Ok(hits.into_iter().map(Chunk::from).collect())
    }
}
