//! Completion service client
//!
//! Forwards user text to an OpenAI-compatible completion endpoint.

mod openai;

pub use openai::OpenAiProvider;

use thiserror::Error;

/// Errors that can occur during completion requests
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// The provider answered without any completion text
    #[error("Empty response from completion service")]
    EmptyResponse,
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Interface for completion providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, producing at most `max_tokens` output tokens
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}
