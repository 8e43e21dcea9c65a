//! Late-interaction (ColBERT-style) embeddings over HTTP
//!
//! Token-level models are served out of process, typically by an
//! OpenAI-compatible embedding server. The request carries an `input_type`
//! so the server can apply its query or document markers; each returned
//! embedding is a list of token vectors.

use super::provider::{reject_empty, EmbeddingError, LateInteractionProvider};
use super::EmbedRole;
use crate::config::LateInteractionProviderConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Multivector embedding request
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<Vec<f32>>,
    index: usize,
}

/// HTTP late-interaction provider
#[derive(Debug)]
pub struct HttpLateInteractionProvider {
    client: Client,
    endpoint: String,
    model: String,
    token_dimension: usize,
}

impl HttpLateInteractionProvider {
    pub fn new(
        config: &LateInteractionProviderConfig,
        token_dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        info!(
            "Initializing late interaction embedding model: {} via {}",
            config.model, config.endpoint
        );

        let init_error = |reason: String| EmbeddingError::InitializationError {
            model: config.model.clone(),
            reason,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| init_error(format!("Invalid API key format: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| init_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            token_dimension,
        })
    }

    fn input_type(role: EmbedRole) -> &'static str {
        match role {
            EmbedRole::Query => "query",
            EmbedRole::Passage => "document",
        }
    }
}

#[async_trait]
impl LateInteractionProvider for HttpLateInteractionProvider {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        role: EmbedRole,
    ) -> Result<Vec<Vec<Vec<f32>>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_empty(&texts)?;

        debug!(
            "Requesting {} late interaction embeddings ({})",
            texts.len(),
            role.as_str()
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: &texts,
            input_type: Self::input_type(role),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::GenerationError(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding server returned {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::GenerationError(format!("Bad response body: {}", e)))?;

        parsed.data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<Vec<f32>>> =
            parsed.data.into_iter().map(|d| d.embedding).collect();

        validate_multivectors(&embeddings, texts.len(), self.token_dimension)?;
        Ok(embeddings)
    }

    fn token_dimension(&self) -> usize {
        self.token_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn validate_multivectors(
    embeddings: &[Vec<Vec<f32>>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::GenerationError(format!(
            "Embedding count mismatch: expected {}, got {}",
            expected_count,
            embeddings.len()
        )));
    }

    for tokens in embeddings {
        if tokens.is_empty() {
            return Err(EmbeddingError::GenerationError(
                "Server returned a multivector with no tokens".to_string(),
            ));
        }
        if let Some(bad) = tokens.iter().find(|t| t.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
    }
    Ok(())
}
