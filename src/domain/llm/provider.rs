use async_trait::async_trait;
use std::fmt::Debug;

use super::{LlmRequest, LlmResponse, Message};
use crate::domain::DomainError;

/// Text-generation collaborator (OpenAI-compatible chat completions)
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError>;

    fn provider_name(&self) -> &'static str;

    /// `complete(system_prompt, messages) -> text`
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Message>,
    ) -> Result<String, DomainError> {
        let request = LlmRequest::builder()
            .system(system_prompt)
            .messages(messages)
            .temperature(0.0)
            .build();

        let response = self.chat(model, request).await?;
        Ok(response.content().to_string())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::domain::llm::Message;

    type Handler = Arc<dyn Fn(&LlmRequest) -> Result<String, String> + Send + Sync>;

    #[derive(Clone)]
    pub struct MockLlmProvider {
        name: &'static str,
        response: Option<String>,
        error: Option<String>,
        handler: Option<Handler>,
        calls: Arc<AtomicUsize>,
    }

    impl std::fmt::Debug for MockLlmProvider {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockLlmProvider")
                .field("name", &self.name)
                .field("response", &self.response)
                .field("error", &self.error)
                .finish()
        }
    }

    impl MockLlmProvider {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                response: None,
                error: None,
                handler: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_response(mut self, content: impl Into<String>) -> Self {
            self.response = Some(content.into());
            self
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        /// Computes each reply from the request
        pub fn with_handler<F>(mut self, handler: F) -> Self
        where
            F: Fn(&LlmRequest) -> Result<String, String> + Send + Sync + 'static,
        {
            self.handler = Some(Arc::new(handler));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(ref error) = self.error {
                return Err(DomainError::external(self.name, error));
            }

            let content = match (&self.handler, &self.response) {
                (Some(handler), _) => {
                    handler(&request).map_err(|e| DomainError::external(self.name, e))?
                }
                (None, Some(content)) => content.clone(),
                (None, None) => {
                    return Err(DomainError::external(self.name, "No mock response configured"))
                }
            };

            Ok(LlmResponse::new("mock-id", model, Message::assistant(content)))
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockLlmProvider;
    use super::*;

    #[tokio::test]
    async fn test_complete_sends_system_prompt_first() {
        let provider = MockLlmProvider::new("mock").with_handler(|req| {
            Ok(format!(
                "{}|{}",
                req.system_prompt().unwrap_or_default(),
                req.last_user_message().unwrap_or_default()
            ))
        });

        let text = provider
            .complete("m", "be brief", vec![Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(text, "be brief|hi");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_error_is_external_service() {
        let provider = MockLlmProvider::new("mock").with_error("down");
        let err = provider.complete("m", "s", vec![]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
