//! RagForge context engine
//!
//! Coordinates ingestion (processor to persistent index) and question
//! answering (retriever, prompt, chat model) over the ingestion and search
//! crates.

pub mod chain;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;

pub use chain::{RagChain, RetrievedContext, PromptVariables};
pub use orchestrator::{RagOrchestrator, NO_CONTEXT_ANSWER};
pub use pipeline::{Pipeline, Stage};
pub use prompts::PromptTemplate;
