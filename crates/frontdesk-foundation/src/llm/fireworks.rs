//! Fireworks AI provider.
//!
//! Fireworks serves an OpenAI-compatible chat completions API, so the
//! provider is a plain JSON POST with bearer auth; no SDK required.

use async_trait::async_trait;
use std::time::Duration;

use frontdesk_kernel::llm::{
    ChatCompletionRequest, ChatCompletionResponse, LLMError, LLMProvider, LLMResult,
};

const FIREWORKS_API_URL: &str = "https://api.fireworks.ai/inference/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct FireworksConfig {
    pub api_key: String,
    pub endpoint: String,
    pub default_model: String,
    pub request_timeout: Duration,
}

impl FireworksConfig {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: FIREWORKS_API_URL.to_string(),
            default_model: default_model.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Chat-completion provider backed by the Fireworks inference endpoint.
pub struct FireworksProvider {
    client: reqwest::Client,
    config: FireworksConfig,
}

impl FireworksProvider {
    pub fn new(config: FireworksConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl LLMProvider for FireworksProvider {
    fn name(&self) -> &str {
        "fireworks"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn chat(&self, request: ChatCompletionRequest) -> LLMResult<ChatCompletionResponse> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LLMError::Malformed(e.to_string()))
    }
}
