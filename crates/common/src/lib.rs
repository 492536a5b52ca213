//! RagForge Common Library
//!
//! Shared code for all RagForge crates including:
//! - Document and chunk data model
//! - Embedding and chat model abstractions
//! - Error types and handling
//! - Configuration management
//! - Provider retry policy
//! - Logging, metrics and observability

pub mod config;
pub mod document;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use document::{Chunk, Document, Metadata, MetadataValue};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::{Generation, Generator, RenderedPrompt};
pub use retry::RetryPolicy;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
