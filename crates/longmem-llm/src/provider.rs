use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request to a chat-completion provider. The extractor and consolidator
/// both always request JSON-object responses, so `json_mode` has no
/// "off" use inside this workspace, but the field stays explicit rather
/// than implied so the provider impl has no hidden assumption.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub json_mode: bool,
}

/// Token usage reported by a chat-completion call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: ChatUsage,
}

/// Common interface for OpenAI-compatible chat-completion endpoints.
/// The extractor (§4.3) and consolidator (§4.7) are the only callers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse>;
}

/// Usage reported by an embedding call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingUsage {
    pub total_tokens: u32,
}

/// Common interface for OpenAI-compatible embedding endpoints.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed vector width this provider is configured to return.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts in one request. Order is preserved.
    async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, EmbeddingUsage)>;
}
