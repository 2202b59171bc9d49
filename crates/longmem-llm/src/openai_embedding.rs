use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingUsage};

/// Embedding client for any OpenAI-compatible endpoint
/// (`{model, input, dimensions}` in, `{data: [{embedding}], usage}` out).
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, base_url: String, model: String, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, EmbeddingUsage)> {
        if texts.is_empty() {
            return Ok((Vec::new(), EmbeddingUsage::default()));
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimensions,
        });

        let url = format!("{}/v1/embeddings", self.base_url);
        debug!(model = %self.model, count = texts.len(), "sending embedding request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "embedding API error");
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let vectors: Vec<Vec<f32>> = api_resp.data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            if v.len() != self.dimensions {
                return Err(LlmError::DimensionMismatch {
                    expected: self.dimensions,
                    got: v.len(),
                });
            }
        }

        let usage = EmbeddingUsage {
            total_tokens: api_resp.usage.map(|u| u.total_tokens).unwrap_or(0),
        };

        Ok((vectors, usage))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Vec<EmbeddingData>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}
