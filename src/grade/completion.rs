#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use async_openai::{Client as OpenAIClient, config::OpenAIConfig, error::OpenAIError};
use futures::future::BoxFuture;

use super::request::GradingRequest;
use crate::config::OpenAiEnv;

/// Ways a completion call can fail. All of them degrade to a fail verdict.
#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    /// No response within the configured per-call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The OpenAI client reported an error.
    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
    /// Any other service failure.
    #[error("{0}")]
    Service(String),
}

/// A remote chat-completion service returning the text of one completion.
///
/// Missing content is reported as an empty string, not as an error.
pub trait CompletionService: Send + Sync {
    /// Sends `request` and returns the completion text.
    fn complete(&self, request: GradingRequest) -> BoxFuture<'_, Result<String, CompletionError>>;
}

/// [`CompletionService`] backed by an OpenAI-compatible API.
pub struct OpenAiCompletion {
    /// Configured client.
    client: OpenAIClient<OpenAIConfig>,
}

impl OpenAiCompletion {
    /// Creates a client from the environment bundle.
    pub fn new(openai: &OpenAiEnv) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(openai.api_base().to_owned())
                .with_api_key(openai.api_key().to_owned()),
        );
        Self { client }
    }
}

impl CompletionService for OpenAiCompletion {
    fn complete(&self, request: GradingRequest) -> BoxFuture<'_, Result<String, CompletionError>> {
        Box::pin(async move {
            tracing::debug!(
                "Requesting completion for question {} from {}",
                request.question,
                request.model
            );
            let response = self.client.chat().create(request.to_openai()?).await?;

            Ok(response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default())
        })
    }
}
