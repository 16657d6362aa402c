//! Voyage AI embedding client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use frontdesk_kernel::embedding::{validate_vector, EmbeddingClient, EmbeddingError};

const VOYAGE_API_URL: &str = "https://api.voyageai.com/v1/embeddings";
const EMBEDDING_MODEL: &str = "voyage-2";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embedding client backed by the Voyage AI HTTP API.
pub struct VoyageEmbeddings {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl VoyageEmbeddings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: VOYAGE_API_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl EmbeddingClient for VoyageEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: vec![text],
                model: EMBEDDING_MODEL,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Unavailable(format!(
                "embedding endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let vector = body
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| {
                EmbeddingError::Unavailable("embedding response contained no data".to_string())
            })?;

        validate_vector(&vector)?;
        Ok(vector)
    }
}
