//! RAG orchestrator
//!
//! Coordinates the document processor, the vector store manager and the
//! chat model for the two entry points:
//! - ingestion: load -> split -> enrich -> persist
//! - answering: global (persistent index) or ephemeral (one upload, never stored)

use crate::chain::RagChain;
use crate::prompts::PromptTemplate;
use ragforge_common::config::{AppConfig, RetrievalConfig};
use ragforge_common::embeddings::{Embedder, OpenAIEmbedder};
use ragforge_common::errors::{AppError, Result};
use ragforge_common::llm::{Generator, OpenAIChatGenerator};
use ragforge_common::metrics;
use ragforge_common::retry::RetryPolicy;
use ragforge_ingestion::DocumentProcessor;
use ragforge_search::{PersistSummary, VectorStoreManager};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Answer returned when the knowledge base holds nothing to ground on
pub const NO_CONTEXT_ANSWER: &str =
    "I don't know. No relevant information was found in the knowledge base.";

/// Separator between retrieved chunks in the global prompt
pub const GLOBAL_CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Separator between retrieved chunks in the ephemeral prompt
pub const EPHEMERAL_CONTEXT_SEPARATOR: &str = "\n\n";

pub struct RagOrchestrator {
    processor: DocumentProcessor,
    store: Arc<VectorStoreManager>,
    generator: Arc<dyn Generator>,
    retrieval: RetrievalConfig,
}

impl RagOrchestrator {
    pub fn new(
        processor: DocumentProcessor,
        store: Arc<VectorStoreManager>,
        generator: Arc<dyn Generator>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            processor,
            store,
            generator,
            retrieval,
        }
    }

    /// Production wiring: OpenAI embeddings and chat, pgvector persistence
    ///
    /// Every required setting is checked here. Nothing touches the network
    /// until the first ingestion or question.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = RetryPolicy::from(&config.retry);
        let processor = DocumentProcessor::new(&config.chunking)?;
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(&config.openai, retry.clone())?);
        let generator: Arc<dyn Generator> = Arc::new(OpenAIChatGenerator::new(&config.openai, retry)?);
        let store = Arc::new(VectorStoreManager::from_config(config, embedder)?);

        info!(
            embedding_model = %config.openai.embedding_model,
            chat_model = %config.openai.chat_model,
            table = %config.database.table_name,
            "RAG orchestrator configured"
        );

        Ok(Self::new(processor, store, generator, config.retrieval.clone()))
    }

    pub fn store(&self) -> &Arc<VectorStoreManager> {
        &self.store
    }

    pub fn processor(&self) -> &DocumentProcessor {
        &self.processor
    }

    /// Ingest a file from disk into the persistent index
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_document(&self, path: &Path) -> Result<PersistSummary> {
        let start = Instant::now();

        let result = async {
            let documents = self.processor.load_document(path).await?;
            self.ingest(documents).await
        }
        .await
        .inspect_err(|e| error!(path = %path.display(), error = %e, "Document processing failed"))?;

        metrics::record_ingestion(start.elapsed().as_secs_f64(), result.total_chunks, "file");
        Ok(result)
    }

    /// Ingest an already stored upload whose bytes are in memory
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn process_stored_bytes(
        &self,
        bytes: &[u8],
        display_name: &str,
        source: &str,
    ) -> Result<PersistSummary> {
        let start = Instant::now();

        let result = async {
            let documents = self.processor.load_document_from_bytes(bytes, display_name, source)?;
            self.ingest(documents).await
        }
        .await
        .inspect_err(|e| error!(source, error = %e, "Document processing failed"))?;

        metrics::record_ingestion(start.elapsed().as_secs_f64(), result.total_chunks, "stored");
        Ok(result)
    }

    async fn ingest(&self, documents: Vec<ragforge_common::Document>) -> Result<PersistSummary> {
        let chunks = self.processor.split_documents(&documents);
        let chunks = self.processor.enrich_metadata(chunks);
        let summary = self.store.persist(&chunks).await?;

        info!(
            documents = documents.len(),
            total_chunks = summary.total_chunks,
            "Document ingested"
        );
        Ok(summary)
    }

    /// Answer from the persistent knowledge base
    #[instrument(skip(self, question))]
    pub async fn answer_global_question(&self, question: &str) -> Result<String> {
        let question = require_question(question)?;

        async {
            let retriever = self.store.build_global_retriever(self.retrieval.global_k).await?;
            RagChain::new(retriever, self.generator.clone(), PromptTemplate::global())
                .separator(GLOBAL_CONTEXT_SEPARATOR)
                .log_sources(true)
                .empty_context_fallback(NO_CONTEXT_ANSWER)
                .build()
                .invoke(question.to_string())
                .await
        }
        .await
        .inspect_err(|e| error!(question, error = %e, "Global question failed"))
    }

    /// Answer about a single uploaded document without persisting it
    #[instrument(skip(self, bytes, question), fields(bytes = bytes.len()))]
    pub async fn answer_ephemeral_question(
        &self,
        bytes: &[u8],
        display_name: &str,
        question: &str,
    ) -> Result<String> {
        let question = require_question(question)?;

        async {
            let documents = self.processor.load_document_from_buffer(bytes, display_name)?;
            let chunks = self.processor.split_documents(&documents);
            let retriever = self
                .store
                .build_ephemeral_retriever(&chunks, self.retrieval.ephemeral_k)
                .await?;

            RagChain::new(retriever, self.generator.clone(), PromptTemplate::ephemeral())
                .separator(EPHEMERAL_CONTEXT_SEPARATOR)
                .build()
                .invoke(question.to_string())
                .await
        }
        .await
        .inspect_err(|e| error!(display_name, question, error = %e, "Ephemeral question failed"))
    }
}

fn require_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("question must not be empty", Some("question")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_common::config::{ChunkingConfig, OpenAiConfig};
    use ragforge_common::document::SOURCE_KEY;
    use ragforge_common::embeddings::HashEmbedder;
    use ragforge_common::llm::StaticGenerator;
    use ragforge_search::{InMemoryConnector, PersistStatus, VectorIndex};
    use std::io::Write;
    use tokio_test::assert_ok;

    struct Fixture {
        orchestrator: RagOrchestrator,
        connector: Arc<InMemoryConnector>,
        generator: Arc<StaticGenerator>,
    }

    fn fixture() -> Fixture {
        let connector = Arc::new(InMemoryConnector::new());
        let generator = Arc::new(StaticGenerator::new("grounded answer"));
        let store = Arc::new(VectorStoreManager::new(
            Arc::new(HashEmbedder::new(128)),
            connector.clone(),
        ));
        let processor = DocumentProcessor::new(&ChunkingConfig {
            chunk_size: 120,
            chunk_overlap: 20,
        })
        .unwrap();

        Fixture {
            orchestrator: RagOrchestrator::new(processor, store, generator.clone(), RetrievalConfig::default()),
            connector,
            generator,
        }
    }

    #[tokio::test]
    async fn test_process_document_persists_chunks() {
        let f = fixture();
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "{}", "Refunds are processed within thirty days. ".repeat(10)).unwrap();

        let summary = assert_ok!(f.orchestrator.process_document(file.path()).await);

        assert_eq!(summary.status, PersistStatus::Persisted);
        assert!(summary.total_chunks > 1);
        assert_eq!(f.connector.index().count().await.unwrap(), summary.total_chunks);
    }

    #[tokio::test]
    async fn test_process_document_missing_file_is_io_error() {
        let f = fixture();
        let err = f
            .orchestrator
            .process_document(Path::new("/nonexistent/ragforge/report.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Io { .. }));
        assert_eq!(f.connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_stored_bytes_keep_remote_source() {
        let f = fixture();
        f.orchestrator
            .process_stored_bytes(b"Quarterly revenue grew.", "q3.txt", "s3://bucket/q3.txt")
            .await
            .unwrap();

        let hits = f
            .connector
            .index()
            .similarity_search(&HashEmbedder::new(128).embed("revenue").await.unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].metadata[SOURCE_KEY].as_str(), Some("s3://bucket/q3.txt"));
    }

    #[tokio::test]
    async fn test_global_question_answers_from_knowledge_base() {
        let f = fixture();
        f.orchestrator
            .process_stored_bytes(b"The refund window is thirty days.", "policy.txt", "policy.txt")
            .await
            .unwrap();

        let answer = f.orchestrator.answer_global_question("What is the refund window?").await.unwrap();

        assert_eq!(answer, "grounded answer");
        let system = f.generator.last_prompt().unwrap().system().unwrap().to_string();
        assert!(system.contains("The refund window is thirty days."));
        assert!(system.contains("knowledge base"));
    }

    #[tokio::test]
    async fn test_global_question_without_content_returns_fallback() {
        let f = fixture();

        let answer = f.orchestrator.answer_global_question("Anything at all?").await.unwrap();

        assert_eq!(answer, NO_CONTEXT_ANSWER);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_ephemeral_question_never_touches_persistent_index() {
        let f = fixture();

        let answer = f
            .orchestrator
            .answer_ephemeral_question(b"Invoice total: 420 EUR.", "invoice.txt", "What is the total?")
            .await
            .unwrap();

        assert_eq!(answer, "grounded answer");
        assert_eq!(f.connector.connects(), 0);
        assert!(!f.orchestrator.store().is_initialized());
        let system = f.generator.last_prompt().unwrap().system().unwrap().to_string();
        assert!(system.contains("Invoice total: 420 EUR."));
        assert!(system.contains("NOT stored permanently"));
    }

    #[tokio::test]
    async fn test_ephemeral_question_rejects_undecodable_text() {
        let f = fixture();
        let err = f
            .orchestrator
            .answer_ephemeral_question(&[0xff, 0xfe, 0x00, 0xc3], "notes.txt", "What?")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Parse { .. }));
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_question_is_validation_error() {
        let f = fixture();
        let err = f.orchestrator.answer_global_question("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_from_config_missing_credential_is_configuration_error() {
        let mut config = AppConfig::default();
        config.database.url = Some("postgres://localhost/rag".to_string());

        let result = RagOrchestrator::from_config(&config);

        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_from_config_missing_database_url_is_configuration_error() {
        let mut config = AppConfig::default();
        config.openai = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            ..OpenAiConfig::default()
        };

        let result = RagOrchestrator::from_config(&config);

        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
