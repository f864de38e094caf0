//! Retrieval-augmented answer chain.
//!
//! A [`RagChain`] binds the shared [`VectorStoreGateway`] to one
//! [`LlmProvider`]. Answering a question retrieves the top-K chunks, renders
//! them into the prompt with a numbered source label each, generates, and
//! returns the answer together with the sources and the provider's privacy
//! note. Failures propagate unchanged; a chain never falls back to another
//! provider.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::gateway::VectorStoreGateway;
use crate::llm::{LlmProvider, ProviderIdentity};
use crate::models::{RetrievalResult, ScoredChunk, Source};

const NO_CONTEXT: &str = "No relevant context was found in the indexed documents.";

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub privacy_note: String,
    pub provider_used: ProviderIdentity,
}

/// Render retrieved chunks as `[n] source: path` blocks.
pub fn build_context(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "[{}] source: {}\n{}",
                i + 1,
                scored.chunk.metadata.source_path,
                scored.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an expert Angular and React developer assistant with access to the team's private framework documentation and codebase.

Use the following context from the team's docs and code to answer the question. Be precise, follow Angular/React best practices, and provide code examples when appropriate. Refer to sources by their [n] label.

Context:
{context}

Question: {question}

Answer:"#,
        context = context,
        question = question
    )
}

pub struct RagChain {
    gateway: Arc<VectorStoreGateway>,
    provider: LlmProvider,
    top_k: i64,
}

impl RagChain {
    pub fn new(gateway: Arc<VectorStoreGateway>, provider: LlmProvider, top_k: i64) -> Self {
        Self {
            gateway,
            provider,
            top_k,
        }
    }

    pub fn identity(&self) -> ProviderIdentity {
        self.provider.identity()
    }

    /// Retrieval only, no generation.
    pub async fn retrieve(&self, question: &str, k: i64) -> Result<RetrievalResult> {
        self.gateway.search(question, k).await
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::invalid_argument("question must not be empty"));
        }

        let results = self.retrieve(question, self.top_k).await?;
        debug!(retrieved = results.len(), provider = %self.identity(), "retrieved context");

        let prompt = build_prompt(question, &build_context(&results));
        let answer = self.provider.generate(&prompt).await?;

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources: results.iter().map(Source::from).collect(),
            privacy_note: self.provider.privacy_note().to_string(),
            provider_used: self.identity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::embedding::HashingEmbedder;
    use crate::llm::{ProviderKind, LOCAL_PRIVACY_NOTE};
    use crate::models::{Category, Chunk, ChunkMetadata};
    use crate::store::MemoryStore;

    fn scored(path: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    source_path: path.to_string(),
                    category: Category::Code,
                    file_type: "ts".to_string(),
                    chunk_index: 0,
                },
                hash: String::new(),
            },
            score: 0.5,
        }
    }

    fn local_chain() -> RagChain {
        let gateway = Arc::new(VectorStoreGateway::new(
            Arc::new(HashingEmbedder::new(32)),
            Arc::new(MemoryStore::new()),
            "code_docs",
            8,
            5,
        ));
        let mut config = LlmConfig::default();
        config.local.endpoint = "http://127.0.0.1:9".to_string();
        config.local.timeout_secs = 2;
        let identity = ProviderIdentity::resolve(ProviderKind::Local, &config);
        RagChain::new(gateway, LlmProvider::build(&identity, &config).unwrap(), 5)
    }

    #[test]
    fn test_context_labels_sources() {
        let context = build_context(&[
            scored("docs/auth.md", "Emails are validated."),
            scored("src/auth.ts", "function validateEmail() {}"),
        ]);
        assert!(context.starts_with("[1] source: docs/auth.md\nEmails are validated."));
        assert!(context.contains("[2] source: src/auth.ts\nfunction validateEmail() {}"));
    }

    #[test]
    fn test_empty_context_placeholder() {
        assert_eq!(build_context(&[]), NO_CONTEXT);
    }

    #[test]
    fn test_prompt_keeps_question_verbatim() {
        let prompt = build_prompt("How is {email} validated?", "ctx");
        assert!(prompt.contains("Question: How is {email} validated?"));
        assert!(prompt.contains("Context:\nctx\n"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let chain = local_chain();
        for q in ["", "   "] {
            assert!(matches!(
                chain.answer(q).await.unwrap_err(),
                RagError::InvalidArgument(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let chain = local_chain();
        let err = chain.answer("anything?").await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable(_)));
        assert_eq!(chain.identity().kind, ProviderKind::Local);
        assert_eq!(chain.provider.privacy_note(), LOCAL_PRIVACY_NOTE);
    }
}
