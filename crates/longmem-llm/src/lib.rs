//! `longmem-llm` — the two external collaborators the memory engine talks
//! to over HTTP: an OpenAI-compatible chat-completion endpoint and an
//! OpenAI-compatible embedding endpoint.
//!
//! Both are hidden behind narrow traits ([`provider::ChatProvider`],
//! [`provider::EmbeddingProvider`]) so the extractor, consolidator, and
//! retriever in `longmem-engine` can be tested against fixtures instead
//! of a live network call.

pub mod cache;
pub mod error;
pub mod openai_chat;
pub mod openai_embedding;
pub mod provider;

pub use cache::{CachingEmbedder, EmbedderUsageTotals};
pub use error::{LlmError, Result};
pub use openai_chat::OpenAiChatProvider;
pub use openai_embedding::OpenAiEmbeddingProvider;
pub use provider::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatUsage, EmbeddingProvider,
    EmbeddingUsage,
};
