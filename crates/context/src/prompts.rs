//! Prompt templates
//!
//! The retrieved context goes into the system message; the user message is
//! the question itself.

use ragforge_common::llm::RenderedPrompt;

/// Placeholder replaced with the assembled context
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
/// Placeholder replaced with the user's question
pub const QUESTION_PLACEHOLDER: &str = "{question}";

const GLOBAL_SYSTEM: &str = "You are a helpful corporate assistant. Use the following pieces of context \
retrieved from the knowledge base to answer the question.\n\
Always base your answer only on the context below. If the answer is not in the context, say that you don't know.\n\n\
Context:\n{context}";

const EPHEMERAL_SYSTEM: &str = "You are a helpful assistant. Use the retrieved context to answer the question.\n\
This document is NOT stored permanently in the knowledge base; answer only about it.\n\
Context: {context}";

/// A system + user message pair with `{context}` and `{question}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system: String,
    user: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Answers strictly from the persistent knowledge base
    pub fn global() -> Self {
        Self::new(GLOBAL_SYSTEM, QUESTION_PLACEHOLDER)
    }

    /// Answers about a single document that is not persisted
    pub fn ephemeral() -> Self {
        Self::new(EPHEMERAL_SYSTEM, QUESTION_PLACEHOLDER)
    }

    /// Substitute both placeholders in both messages
    ///
    /// The context is substituted first, so a question containing
    /// `{context}` is left as typed.
    pub fn render(&self, context: &str, question: &str) -> RenderedPrompt {
        let fill = |template: &str| {
            template
                .split(QUESTION_PLACEHOLDER)
                .map(|part| part.replace(CONTEXT_PLACEHOLDER, context))
                .collect::<Vec<_>>()
                .join(question)
        };
        RenderedPrompt::new(fill(&self.system), fill(&self.user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_prompt_renders_context_in_system_message() {
        let prompt = PromptTemplate::global().render("Refunds take 30 days.", "How long do refunds take?");

        let system = prompt.system().unwrap();
        assert!(system.ends_with("Context:\nRefunds take 30 days."));
        assert!(system.contains("say that you don't know"));
        assert_eq!(prompt.user(), Some("How long do refunds take?"));
    }

    #[test]
    fn test_ephemeral_prompt_mentions_document_is_not_stored() {
        let prompt = PromptTemplate::ephemeral().render("ctx", "q");
        assert!(prompt.system().unwrap().contains("NOT stored permanently"));
        assert!(prompt.system().unwrap().ends_with("Context: ctx"));
    }

    #[test]
    fn test_placeholders_in_values_are_not_expanded() {
        let template = PromptTemplate::new("C: {context}", "Q: {question}");
        let prompt = template.render("has {question} inside", "has {context} inside");

        assert_eq!(prompt.system(), Some("C: has {question} inside"));
        assert_eq!(prompt.user(), Some("Q: has {context} inside"));
    }
}
