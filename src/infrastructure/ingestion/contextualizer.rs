//! LLM-backed situating context

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ingestion::Contextualizer;
use crate::domain::llm::{LlmProvider, Message};
use crate::domain::DomainError;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Asks a chat model for a short context situating a chunk in its document
#[derive(Debug, Clone)]
pub struct LlmContextualizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmContextualizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn instruction(document: &str, chunk: &str) -> String {
        format!(
            "<document>\n{document}\n</document>\n\n\
             Here is the chunk we want to situate within the whole document:\n\
             <chunk>\n{chunk}\n</chunk>\n\n\
             Give a short, succinct context that situates this chunk within the overall \
             document to improve search retrieval of the chunk. Answer only with the \
             succinct context and nothing else."
        )
    }
}

#[async_trait]
impl Contextualizer for LlmContextualizer {
    async fn contextualize(&self, document: &str, chunk: &str) -> Result<String, DomainError> {
        let context = self
            .provider
            .complete(
                &self.model,
                SYSTEM_PROMPT,
                vec![Message::user(Self::instruction(document, chunk))],
            )
            .await?;

        Ok(context.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::MockLlmProvider;

    #[tokio::test]
    async fn test_prompt_carries_document_and_chunk() {
        let provider = MockLlmProvider::new("mock").with_handler(|request| {
            let prompt = request.last_user_message().unwrap_or_default();
            assert!(prompt.contains("<document>\nFull manual text\n</document>"));
            assert!(prompt.contains("<chunk>\nSection two\n</chunk>"));
            assert_eq!(request.system_prompt(), Some(SYSTEM_PROMPT));
            Ok("  From the manual's setup section.  ".to_string())
        });
        let contextualizer = LlmContextualizer::new(Arc::new(provider), "gpt-4o-mini");

        let context = contextualizer
            .contextualize("Full manual text", "Section two")
            .await
            .unwrap();

        assert_eq!(context, "From the manual's setup section.");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = MockLlmProvider::new("mock").with_error("rate limited");
        let contextualizer = LlmContextualizer::new(Arc::new(provider), "gpt-4o-mini");

        let result = contextualizer.contextualize("doc", "chunk").await;

        assert!(matches!(result, Err(DomainError::ExternalService { .. })));
    }
}
