//! Vector store manager
//!
//! Owns the lazily opened persistent index and builds retrievers over it,
//! plus throwaway in-memory indexes for single-document questions.

use crate::index::{IndexConnector, InMemoryIndex, PgVectorConnector, VectorIndex, VectorRecord};
use crate::retriever::{RetrievalScope, Retriever};
use ragforge_common::config::AppConfig;
use ragforge_common::document::Chunk;
use ragforge_common::embeddings::Embedder;
use ragforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

/// Chunks retrieved from the persistent index per question
pub const DEFAULT_GLOBAL_K: usize = 15;

/// Chunks retrieved from an ephemeral index per question
pub const DEFAULT_EPHEMERAL_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistStatus {
    Persisted,
}

/// Outcome of a successful [`VectorStoreManager::persist`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSummary {
    pub total_chunks: usize,
    pub status: PersistStatus,
}

/// Manages the persistent index and ephemeral indexes
pub struct VectorStoreManager {
    embedder: Arc<dyn Embedder>,
    connector: Arc<dyn IndexConnector>,
    persistent: OnceCell<Arc<dyn VectorIndex>>,
}

impl VectorStoreManager {
    pub fn new(embedder: Arc<dyn Embedder>, connector: Arc<dyn IndexConnector>) -> Self {
        Self {
            embedder,
            connector,
            persistent: OnceCell::new(),
        }
    }

    /// Production wiring: pgvector sized to the embedder's dimension
    ///
    /// Validates the database settings without connecting.
    pub fn from_config(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let connector = PgVectorConnector::new(&config.database, embedder.dimension())?;
        Ok(Self::new(embedder, Arc::new(connector)))
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Whether the persistent index has been opened
    pub fn is_initialized(&self) -> bool {
        self.persistent.initialized()
    }

    /// Open the persistent index on first use
    ///
    /// Concurrent first callers wait on a single connect and share its
    /// handle. A failed connect leaves the cell empty for the next caller.
    async fn persistent_index(&self) -> Result<Arc<dyn VectorIndex>> {
        let index = self
            .persistent
            .get_or_try_init(|| async {
                let index = self.connector.connect().await?;
                info!(backend = index.backend(), "Persistent index initialized");
                Ok::<_, AppError>(index)
            })
            .await?;
        Ok(index.clone())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<VectorRecord>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::provider(
                self.embedder.model_name(),
                format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            ));
        }

        Ok(chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord::from_chunk(chunk, embedding))
            .collect())
    }

    /// Embed and upsert chunks into the persistent index in one batch
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn persist(&self, chunks: &[Chunk]) -> Result<PersistSummary> {
        if chunks.is_empty() {
            return Ok(PersistSummary {
                total_chunks: 0,
                status: PersistStatus::Persisted,
            });
        }

        let records = self.embed_chunks(chunks).await?;
        let index = self.persistent_index().await?;
        let written = index.upsert(records).await?;

        info!(total_chunks = written, "Chunks persisted");

        Ok(PersistSummary {
            total_chunks: written,
            status: PersistStatus::Persisted,
        })
    }

    /// Retriever over the persistent index
    pub async fn build_global_retriever(&self, k: usize) -> Result<Retriever> {
        let index = self.persistent_index().await?;
        Ok(Retriever::new(index, self.embedder.clone(), k, RetrievalScope::Global))
    }

    /// Retriever over a fresh in-memory index holding only `chunks`
    ///
    /// The index is owned by the returned retriever and dropped with it.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn build_ephemeral_retriever(&self, chunks: &[Chunk], k: usize) -> Result<Retriever> {
        let index = InMemoryIndex::new();
        if !chunks.is_empty() {
            // Unenriched chunks can share an id when their text repeats
            let records: Vec<VectorRecord> = self
                .embed_chunks(chunks)
                .await?
                .into_iter()
                .enumerate()
                .map(|(position, mut record)| {
                    record.id = format!("{}#{}", position, record.id);
                    record
                })
                .collect();
            index.upsert(records).await?;
        }

        Ok(Retriever::new(
            Arc::new(index),
            self.embedder.clone(),
            k,
            RetrievalScope::Ephemeral,
        ))
    }

    /// Open the persistent index if needed and report its size
    pub async fn check_ready(&self) -> Result<usize> {
        self.persistent_index().await?.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryConnector;
    use async_trait::async_trait;
    use ragforge_common::document::SOURCE_KEY;
    use ragforge_common::embeddings::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new(64))
    }

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk::new(text).with_metadata(SOURCE_KEY, source)
    }

    /// Slow connector that can be told to fail its first attempt
    struct SlowConnector {
        connects: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl IndexConnector for SlowConnector {
        async fn connect(&self) -> Result<Arc<dyn VectorIndex>> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && attempt == 0 {
                return Err(AppError::transient("pgvector", "connection refused"));
            }
            Ok(Arc::new(InMemoryIndex::new()))
        }
    }

    fn data_ptr(index: &Arc<dyn VectorIndex>) -> *const () {
        Arc::as_ptr(index) as *const ()
    }

    #[tokio::test]
    async fn test_persist_reports_total() {
        let connector = Arc::new(InMemoryConnector::new());
        let manager = VectorStoreManager::new(embedder(), connector.clone());
        let chunks: Vec<Chunk> = (1..=5)
            .map(|i| chunk(&format!("chunk number {}", i), "five.txt"))
            .collect();

        let summary = assert_ok!(manager.persist(&chunks).await);

        assert_eq!(
            summary,
            PersistSummary {
                total_chunks: 5,
                status: PersistStatus::Persisted
            }
        );
        assert_eq!(connector.index().count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_persist_empty_does_not_connect() {
        let connector = Arc::new(InMemoryConnector::new());
        let manager = VectorStoreManager::new(embedder(), connector.clone());

        let summary = manager.persist(&[]).await.unwrap();

        assert_eq!(summary.total_chunks, 0);
        assert_eq!(connector.connects(), 0);
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_first_use_connects_once() {
        let connector = Arc::new(SlowConnector {
            connects: AtomicUsize::new(0),
            fail_first: false,
        });
        let manager = VectorStoreManager::new(embedder(), connector.clone());

        let (a, b) = tokio::join!(
            manager.build_global_retriever(DEFAULT_GLOBAL_K),
            manager.build_global_retriever(DEFAULT_GLOBAL_K)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(data_ptr(a.index()), data_ptr(b.index()));
        assert_eq!(a.k(), 15);
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried_by_next_caller() {
        let connector = Arc::new(SlowConnector {
            connects: AtomicUsize::new(0),
            fail_first: true,
        });
        let manager = VectorStoreManager::new(embedder(), connector.clone());

        assert!(manager.check_ready().await.is_err());
        assert!(!manager.is_initialized());
        assert_eq!(manager.check_ready().await.unwrap(), 0);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_global_retriever_ranks_persisted_chunks() {
        let manager = VectorStoreManager::new(embedder(), Arc::new(InMemoryConnector::new()));
        manager
            .persist(&[
                chunk("refunds are issued within thirty days", "policy.txt"),
                chunk("the office is closed on public holidays", "handbook.txt"),
            ])
            .await
            .unwrap();

        let retriever = manager.build_global_retriever(1).await.unwrap();
        let hits = retriever.retrieve("when are refunds issued").await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source(), Some("policy.txt"));
    }

    #[tokio::test]
    async fn test_ephemeral_retriever_is_isolated() {
        let connector = Arc::new(InMemoryConnector::new());
        let manager = VectorStoreManager::new(embedder(), connector.clone());

        let first = manager
            .build_ephemeral_retriever(&[chunk("alpha contents", "memory://a.txt")], DEFAULT_EPHEMERAL_K)
            .await
            .unwrap();
        let second = manager
            .build_ephemeral_retriever(&[chunk("beta contents", "memory://b.txt")], DEFAULT_EPHEMERAL_K)
            .await
            .unwrap();

        assert_eq!(first.scope(), RetrievalScope::Ephemeral);
        assert_eq!(first.index().count().await.unwrap(), 1);
        assert_ne!(data_ptr(first.index()), data_ptr(second.index()));
        let hits = second.retrieve("alpha").await.unwrap();
        assert_eq!(hits[0].source(), Some("memory://b.txt"));

        assert_eq!(connector.connects(), 0);
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_ephemeral_retriever_keeps_repeated_chunks() {
        let manager = VectorStoreManager::new(embedder(), Arc::new(InMemoryConnector::new()));
        let chunks = vec![
            chunk("Terms apply.", "memory://a.txt"),
            chunk("other text", "memory://a.txt"),
            chunk("Terms apply.", "memory://a.txt"),
        ];

        let retriever = manager
            .build_ephemeral_retriever(&chunks, DEFAULT_EPHEMERAL_K)
            .await
            .unwrap();

        assert_eq!(retriever.index().count().await.unwrap(), 3);
        assert_eq!(retriever.retrieve("terms").await.unwrap().len(), 3);
    }

    #[test]
    fn test_from_config_requires_database_url() {
        let config = AppConfig::default();
        let result = VectorStoreManager::from_config(&config, embedder());
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
