//! RagForge search
//!
//! Vector indexes (pgvector and in-memory), retrievers over them, and the
//! [`VectorStoreManager`] that owns the persistent index.

pub mod index;
pub mod manager;
pub mod retriever;

pub use index::{IndexConnector, InMemoryConnector, InMemoryIndex, ScoredRecord, VectorIndex, VectorRecord};
pub use manager::{PersistStatus, PersistSummary, VectorStoreManager, DEFAULT_EPHEMERAL_K, DEFAULT_GLOBAL_K};
pub use retriever::{RetrievalScope, Retriever};
