//! Situating-context generation for chunks

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Produces a short context that situates `chunk` within `document`
#[async_trait]
pub trait Contextualizer: Send + Sync + Debug {
    async fn contextualize(&self, document: &str, chunk: &str) -> Result<String, DomainError>;
}

/// Indexed form of a chunk: context and original joined by a blank line
pub fn contextualized_text(context: &str, chunk: &str) -> String {
    let context = context.trim();

    if context.is_empty() {
        chunk.to_string()
    } else {
        format!("{}\n\n{}", context, chunk)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the first words of each chunk as its context. Chunks containing
    /// any of `fail_on` fail; `delay` simulates a slow model.
    #[derive(Debug, Default)]
    pub struct MockContextualizer {
        fail_on: HashSet<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl MockContextualizer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
            self.fail_on.insert(marker.into());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Contextualizer for MockContextualizer {
        async fn contextualize(&self, _document: &str, chunk: &str) -> Result<String, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail_on.iter().any(|m| chunk.contains(m.as_str())) {
                return Err(DomainError::external("llm", "context generation failed"));
            }

            let head: Vec<&str> = chunk.split_whitespace().take(3).collect();
            Ok(format!("About: {}", head.join(" ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contextualized_text_joins_with_blank_line() {
        assert_eq!(contextualized_text("Intro", "Body"), "Intro\n\nBody");
        assert_eq!(contextualized_text("  ", "Body"), "Body");
    }
}
