//! RagForge ingestion
//!
//! Turns files and upload buffers into enriched, retrieval-sized chunks.

pub mod chunker;
pub mod loader;
pub mod processor;

pub use chunker::{RecursiveSplitter, TextChunk};
pub use processor::DocumentProcessor;
