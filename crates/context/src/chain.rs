//! Retrieval-augmented answer chain
//!
//! question -> retrieve -> assemble context -> render prompt -> generate -> text

use crate::pipeline::{Pipeline, Stage};
use crate::prompts::PromptTemplate;
use async_trait::async_trait;
use ragforge_common::document::Chunk;
use ragforge_common::errors::Result;
use ragforge_common::llm::{Generation, Generator, RenderedPrompt, Role};
use ragforge_search::Retriever;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// A question with the chunks retrieved for it, most similar first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub question: String,
    pub chunks: Vec<Chunk>,
}

/// Values substituted into a prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptVariables {
    pub context: String,
    pub question: String,
    pub chunk_count: usize,
}

pub struct RetrieveStage {
    retriever: Retriever,
    log_sources: bool,
}

#[async_trait]
impl Stage<String, RetrievedContext> for RetrieveStage {
    async fn run(&self, question: String) -> Result<RetrievedContext> {
        let chunks = self.retriever.retrieve(&question).await?;

        if self.log_sources {
            let sources: BTreeSet<&str> = chunks.iter().filter_map(|c| c.source()).collect();
            info!(
                scope = self.retriever.scope().as_str(),
                chunks = chunks.len(),
                sources = ?sources,
                "Retrieved context"
            );
        }

        Ok(RetrievedContext { question, chunks })
    }

    fn name(&self) -> &'static str {
        "retrieve"
    }
}

pub struct AssembleContextStage {
    separator: String,
}

#[async_trait]
impl Stage<RetrievedContext, PromptVariables> for AssembleContextStage {
    async fn run(&self, input: RetrievedContext) -> Result<PromptVariables> {
        let context = input
            .chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator);

        Ok(PromptVariables {
            context,
            question: input.question,
            chunk_count: input.chunks.len(),
        })
    }

    fn name(&self) -> &'static str {
        "assemble_context"
    }
}

pub struct RenderPromptStage {
    template: PromptTemplate,
}

#[async_trait]
impl Stage<PromptVariables, RenderedPrompt> for RenderPromptStage {
    async fn run(&self, vars: PromptVariables) -> Result<RenderedPrompt> {
        Ok(self
            .template
            .render(&vars.context, &vars.question)
            .with_context_chunks(vars.chunk_count))
    }

    fn name(&self) -> &'static str {
        "render_prompt"
    }
}

pub struct GenerateStage {
    generator: Arc<dyn Generator>,
    temperature: f32,
    /// Reply used instead of calling the model when no chunk was retrieved
    empty_context_fallback: Option<String>,
}

#[async_trait]
impl Stage<RenderedPrompt, Generation> for GenerateStage {
    async fn run(&self, prompt: RenderedPrompt) -> Result<Generation> {
        if let (Some(0), Some(fallback)) = (prompt.context_chunks, &self.empty_context_fallback) {
            info!("No context retrieved, skipping generation");
            return Ok(Generation {
                role: Role::Assistant,
                content: fallback.clone(),
                model: self.generator.model_name().to_string(),
                finish_reason: None,
            });
        }

        self.generator.generate(&prompt, self.temperature).await
    }

    fn name(&self) -> &'static str {
        "generate"
    }
}

pub struct ExtractTextStage;

#[async_trait]
impl Stage<Generation, String> for ExtractTextStage {
    async fn run(&self, generation: Generation) -> Result<String> {
        Ok(generation.content)
    }

    fn name(&self) -> &'static str {
        "extract_text"
    }
}

/// Builder for the question-to-answer pipeline
pub struct RagChain {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    separator: String,
    log_sources: bool,
    temperature: f32,
    empty_context_fallback: Option<String>,
}

impl RagChain {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, template: PromptTemplate) -> Self {
        Self {
            retriever,
            generator,
            template,
            separator: "\n\n".to_string(),
            log_sources: false,
            temperature: 0.0,
            empty_context_fallback: None,
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn log_sources(mut self, enabled: bool) -> Self {
        self.log_sources = enabled;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn empty_context_fallback(mut self, reply: impl Into<String>) -> Self {
        self.empty_context_fallback = Some(reply.into());
        self
    }

    pub fn build(self) -> Pipeline<String, String> {
        Pipeline::new(RetrieveStage {
            retriever: self.retriever,
            log_sources: self.log_sources,
        })
        .then(AssembleContextStage {
            separator: self.separator,
        })
        .then(RenderPromptStage {
            template: self.template,
        })
        .then(GenerateStage {
            generator: self.generator,
            temperature: self.temperature,
            empty_context_fallback: self.empty_context_fallback,
        })
        .then(ExtractTextStage)
    }
}
