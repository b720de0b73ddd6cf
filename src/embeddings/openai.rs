use crate::config::EmbeddingsConfig;
use crate::error::{RagbenchError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Embeds questions for vector-index queries and transcript chunks for upload.
/// Batch embedding retries rate-limit and server errors with exponential
/// backoff; single query embedding does not retry.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client (carries the request timeout)
    /// * `api_key` - OpenAI API key
    /// * `config` - Model, output dimensions and batch size
    pub fn new(client: Client, api_key: String, config: &EmbeddingsConfig) -> Self {
        Self {
            client,
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            // OpenAI caps inputs per request at 2048
            batch_size: config.batch_size.clamp(1, 2048),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();
        let mut embeddings = self.embed_batch_internal(vec![text.to_string()]).await?;
        log::debug!("Embedding API call took {:?}", start.elapsed());
        if embeddings.is_empty() {
            return Err(RagbenchError::Embedding(
                "Empty response from OpenAI API".to_string(),
            ));
        }
        Ok(embeddings.remove(0))
    }

    /// Embed a batch of texts, automatically splitting into smaller batches if needed
    ///
    /// # Returns
    ///
    /// Vector of embeddings, one per input text, in the same order
    pub async fn embed_batch(&self, texts: &[String], max_retries: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embed_with_retry(chunk.to_vec(), max_retries).await?;
            if embeddings.len() != chunk.len() {
                return Err(RagbenchError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }
            all_embeddings.extend(embeddings);

            // Rate limiting: small delay between full batches
            if chunk.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }

    async fn embed_with_retry(&self, texts: Vec<String>, max_retries: usize) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.embed_batch_internal(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if attempt < max_retries && is_retryable(&e) => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single API request
    async fn embed_batch_internal(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: Some(self.dimensions),
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagbenchError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(RagbenchError::Embedding(format!(
                "OpenAI API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagbenchError::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Rate limits (429) and server errors (5xx) are worth retrying.
fn is_retryable(err: &RagbenchError) -> bool {
    let msg = err.to_string();
    ["error 429", "error 500", "error 502", "error 503", "error 504"]
        .iter()
        .any(|code| msg.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(batch_size: usize) -> EmbeddingsConfig {
        EmbeddingsConfig {
            batch_size,
            ..EmbeddingsConfig::default()
        }
    }

    #[test]
    fn test_embedder_new() {
        let embedder = OpenAIEmbedder::new(Client::new(), "test-key".to_string(), &config(100));
        assert_eq!(embedder.model(), "text-embedding-3-large");
        assert_eq!(embedder.dimensions(), 3072);
        assert_eq!(embedder.batch_size, 100);
    }

    #[test]
    fn test_embedder_batch_size_limit() {
        let embedder = OpenAIEmbedder::new(Client::new(), "test-key".to_string(), &config(5000));
        assert_eq!(embedder.batch_size, 2048);
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-large",
            input: vec!["What did Amazon acquire?".to_string()],
            dimensions: Some(3072),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["dimensions"], 3072);
        assert_eq!(json["input"][0], "What did Amazon acquire?");
    }

    #[test]
    fn test_is_retryable() {
        let rate_limited = RagbenchError::Embedding("OpenAI API error 429: slow down".to_string());
        let bad_request = RagbenchError::Embedding("OpenAI API error 400: bad input".to_string());
        assert!(is_retryable(&rate_limited));
        assert!(!is_retryable(&bad_request));
    }

    #[tokio::test]
    async fn test_embed_batch_empty() {
        let embedder = OpenAIEmbedder::new(Client::new(), "test-key".to_string(), &config(10));
        let result = embedder.embed_batch(&[], 3).await.unwrap();
        assert!(result.is_empty());
    }
}
