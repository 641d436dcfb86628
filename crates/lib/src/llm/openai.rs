//! OpenAI-compatible completions client (https://api.openai.com/v1 by default).

use crate::llm::{CompletionBackend, GenerationParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-davinci-003";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for an OpenAI-compatible completions endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(reqwest::Error),
    #[error("completion api error: {0}")]
    Api(String),
    #[error("completion request timed out")]
    Timeout,
    #[error("completion response contained no choices")]
    Empty,
}

impl CompletionClient {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url,
            api_key,
            model,
            client,
        }
    }

    /// POST /completions — non-streaming text completion. Returns the first
    /// choice's text verbatim.
    pub async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: &params.stop,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Request(e)
                }
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Api(format!("{} {}", status, body)));
        }
        let data: CompletionResponse = res.json().await.map_err(CompletionError::Request)?;
        data.choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(CompletionError::Empty)
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        CompletionClient::complete(self, prompt, params).await
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}
