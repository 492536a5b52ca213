//! Text chunking module
//!
//! Splits text into retrieval-sized chunks with `text-splitter`. The
//! splitter prefers the coarsest boundary that fits (paragraph, line,
//! sentence, word, then grapheme), keeps chunks at most `chunk_size`
//! characters and lets consecutive chunks share up to `chunk_overlap`
//! characters. Chunks are trimmed and located by byte offset in the source.

use ragforge_common::config::ChunkingConfig;
use ragforge_common::document::{Chunk, Document, LINE_FROM_KEY, LINE_TO_KEY};
use ragforge_common::errors::{AppError, Result};
use std::fmt;
use std::sync::Arc;
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tracing::debug;

/// A chunk of text located in its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk content, trimmed
    pub content: String,
    /// Start byte position in original text
    pub start_pos: usize,
    /// End byte position in original text
    pub end_pos: usize,
}

/// Boundary-preferring character splitter
#[derive(Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    splitter: Arc<TextSplitter<Characters>>,
}

impl fmt::Debug for RecursiveSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

impl RecursiveSplitter {
    /// Fails when `chunk_overlap >= chunk_size` or `chunk_size == 0`
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;

        let chunk_config = ChunkConfig::new(config.chunk_size)
            .with_overlap(config.chunk_overlap)
            .map_err(|e| AppError::configuration(format!("invalid chunking settings: {}", e)))?;

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            splitter: Arc::new(TextSplitter::new(chunk_config)),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into located chunks, in source order
    pub fn split_text(&self, text: &str) -> Vec<TextChunk> {
        let chunks: Vec<TextChunk> = self
            .splitter
            .chunk_indices(text)
            .filter(|(_, chunk)| !chunk.trim().is_empty())
            .map(|(offset, chunk)| TextChunk {
                content: chunk.to_string(),
                start_pos: offset,
                end_pos: offset + chunk.len(),
            })
            .collect();

        debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            "Text chunked"
        );

        chunks
    }

    /// Split one document into chunks carrying its metadata plus the line span
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let text = document.content.as_str();

        self.split_text(text)
            .into_iter()
            .map(|chunk| {
                let line_from = text[..chunk.start_pos].matches('\n').count() + 1;
                let line_to = line_from + chunk.content.matches('\n').count();

                let mut metadata = document.metadata.clone();
                metadata.insert(LINE_FROM_KEY.to_string(), line_from.into());
                metadata.insert(LINE_TO_KEY.to_string(), line_to.into());

                Chunk {
                    content: chunk.content,
                    metadata,
                }
            })
            .collect()
    }
}
