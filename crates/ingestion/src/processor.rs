//! Document processor
//!
//! Core logic for turning sources into chunks: decoding, splitting and
//! metadata enrichment. Holds no external state.

use crate::chunker::RecursiveSplitter;
use crate::loader::{self, SourceKind};
use chrono::Utc;
use ragforge_common::config::ChunkingConfig;
use ragforge_common::document::{Chunk, Document, MetadataValue, CHUNK_INDEX_KEY, PROCESSED_AT_KEY};
use ragforge_common::errors::{AppError, Result};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Prefix for the provenance of in-memory sources
pub const MEMORY_SOURCE_PREFIX: &str = "memory://";

/// Loads, splits and enriches documents
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    splitter: RecursiveSplitter,
}

impl DocumentProcessor {
    /// Rejects `chunk_overlap >= chunk_size` with a configuration error
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self {
            splitter: RecursiveSplitter::new(config)?,
        })
    }

    pub fn splitter(&self) -> &RecursiveSplitter {
        &self.splitter
    }

    /// Read a file from disk. `.pdf` yields one document per page with text.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn load_document(&self, path: &Path) -> Result<Vec<Document>> {
        let display = path.display().to_string();
        let bytes = tokio::fs::read(path).await.map_err(|source| AppError::Io {
            path: display.clone(),
            source,
        })?;

        let documents = self.load_document_from_bytes(&bytes, &display, &display)?;
        info!(documents = documents.len(), bytes = bytes.len(), "Document loaded");
        Ok(documents)
    }

    /// Decode an in-memory upload; provenance is `memory://<display_name>`
    pub fn load_document_from_buffer(&self, bytes: &[u8], display_name: &str) -> Result<Vec<Document>> {
        let source = format!("{}{}", MEMORY_SOURCE_PREFIX, display_name);
        self.load_document_from_bytes(bytes, display_name, &source)
    }

    /// Decode bytes, choosing the decoder from `display_name` and tagging
    /// every document with `source`
    pub fn load_document_from_bytes(
        &self,
        bytes: &[u8],
        display_name: &str,
        source: &str,
    ) -> Result<Vec<Document>> {
        loader::decode(bytes, SourceKind::from_name(display_name), source)
    }

    /// Split every document, preserving document order. Chunks never span
    /// two documents.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.splitter.split_document(doc))
            .collect();

        debug!(documents = documents.len(), chunks = chunks.len(), "Documents split");
        chunks
    }

    /// Drop blank metadata, number chunks from zero and stamp the processing time
    pub fn enrich_metadata(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let processed_at = Utc::now();

        chunks
            .into_iter()
            .enumerate()
            .map(|(index, mut chunk)| {
                chunk.metadata.retain(|_, value| !value.is_blank());
                chunk
                    .metadata
                    .insert(CHUNK_INDEX_KEY.to_string(), MetadataValue::from(index));
                chunk
                    .metadata
                    .insert(PROCESSED_AT_KEY.to_string(), MetadataValue::from(processed_at));
                chunk
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::sample_pdf;
    use ragforge_common::document::{SOURCE_KEY, PAGE_KEY};
    use std::io::Write;
    use tokio_test::assert_ok;

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(&ChunkingConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let err = DocumentProcessor::new(&ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 200,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_load_text_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Refunds are accepted within 30 days.").unwrap();

        let docs = processor().load_document(file.path()).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Refunds are accepted within 30 days.");
        assert_eq!(docs[0].source(), Some(file.path().display().to_string().as_str()));
    }

    #[tokio::test]
    async fn test_load_pdf_file() {
        let mut file = tempfile::Builder::new().suffix(".PDF").tempfile().unwrap();
        file.write_all(&sample_pdf(&["Quarterly report"])).unwrap();

        let docs = processor().load_document(file.path()).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains("Quarterly report"));
        assert_eq!(docs[0].metadata[PAGE_KEY].as_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        let err = processor().load_document(&missing).await.unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }

    #[test]
    fn test_buffer_source_is_memory_uri() {
        let docs = assert_ok!(processor().load_document_from_buffer(b"inline text", "notes.txt"));
        assert_eq!(docs[0].source(), Some("memory://notes.txt"));
    }

    #[test]
    fn test_split_keeps_documents_apart_and_in_order() {
        let docs = vec![
            Document::new("first document").with_metadata(SOURCE_KEY, "a"),
            Document::new("second document").with_metadata(SOURCE_KEY, "b"),
        ];
        let chunks = processor().split_documents(&docs);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first document");
        assert_eq!(chunks[0].source(), Some("a"));
        assert_eq!(chunks[1].source(), Some("b"));
    }

    #[test]
    fn test_enrich_metadata() {
        let processor = processor();
        let docs = vec![
            Document::new("x".repeat(2500))
                .with_metadata(SOURCE_KEY, "long.txt")
                .with_metadata("author", "")
                .with_metadata("title", MetadataValue::Null),
            Document::new("tail").with_metadata(SOURCE_KEY, "short.txt"),
        ];

        let chunks = processor.enrich_metadata(processor.split_documents(&docs));

        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index(), Some(i as i64));
            assert!(chunk.metadata.values().all(|v| !v.is_blank()));
            assert!(!chunk.metadata.contains_key("author"));
            assert!(matches!(
                chunk.metadata.get(PROCESSED_AT_KEY),
                Some(MetadataValue::Timestamp(_))
            ));
        }
    }

    #[test]
    fn test_processed_at_serializes_as_rfc3339() {
        let processor = processor();
        let chunks = processor.enrich_metadata(vec![Document::new("a")]);
        let json = serde_json::to_value(&chunks[0].metadata).unwrap();
        let stamp = json[PROCESSED_AT_KEY].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
