//! Completion backend abstraction and OpenAI-compatible client.
//!
//! The relay talks to the backend through `CompletionBackend` with a fixed
//! parameter set; the concrete client targets a completions endpoint.

use async_trait::async_trait;

mod openai;

pub use openai::{CompletionClient, CompletionError};

/// Generation parameters for one completion call. The relay passes a fixed
/// set; nothing here is exposed to callers of the webhook.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stop: Vec<String>,
}

/// Text-completion backend: prompt in, completion text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, CompletionError>;
}
