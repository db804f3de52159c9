use async_openai::{Client, config::OpenAIConfig, types::CreateCompletionRequestArgs};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Failures of the text-generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Backend(String),
    #[error("Generation returned no choices")]
    EmptyResponse,
    #[error("Generation did not finish within {0:?}")]
    Timeout(Duration),
}

/// A text-generation service: prompt in, free-form text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Continues `prompt` and returns only the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// An implementation of `Generator` for any OpenAI-compatible completions API,
/// including Ollama's `/v1` endpoint.
pub struct OpenAICompatibleGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleGenerator {
    /// Creates a new generator for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to complete with (e.g., "deepseek-r1-14b-q4").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OpenAICompatibleGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = CreateCompletionRequestArgs::default()
            .model(&self.model)
            .prompt(prompt)
            .build()
            .map_err(|e| GenerationError::Backend(e.to_string()))?;

        let response = self
            .client
            .completions()
            .create(request)
            .await
            .map_err(|e| GenerationError::Backend(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or(GenerationError::EmptyResponse)?;
        debug!(model = %self.model, chars = text.len(), "Generation finished");
        Ok(text)
    }
}
