use std::sync::Mutex;

use chrono::Utc;
use longmem_core::config::EngineConfig;
use longmem_llm::{CachingEmbedder, ChatProvider, EmbeddingProvider};
use longmem_store::{FactPatch, FactRecord, FactStore, Filters};
use tracing::warn;
use uuid::Uuid;

use crate::buffer::ShortTermBuffer;
use crate::consolidator;
use crate::error::Result;
use crate::extractor::{self, ExtractionResult};
use crate::normalizer::Normalizer;
use crate::retriever;
use crate::types::{AddMemoryOutcome, InputMessage, NormalizedMessage, TokenStatistics};

/// Binds the message normalizer, short-term buffer, extractor, embedder,
/// fact store, retriever, and consolidator behind the five public
/// operations of the engine facade. Owned by the caller — there is no
/// process-wide singleton; multi-instance coexistence requires distinct
/// store paths.
pub struct Engine<C: ChatProvider, P: EmbeddingProvider> {
    normalizer: Mutex<Normalizer>,
    buffer: Mutex<ShortTermBuffer>,
    topic_counter: Mutex<u64>,
    store: FactStore,
    chat: C,
    embedder: CachingEmbedder<P>,
    config: EngineConfig,
    stats: Mutex<TokenStatistics>,
}

impl<C: ChatProvider, P: EmbeddingProvider> Engine<C, P> {
    pub fn new(config: EngineConfig, chat: C, embedder: P, store: FactStore) -> Self {
        let token_budget = longmem_core::config::DEFAULT_EXTRACTION_TRIGGER_MESSAGES * 64;
        Self {
            normalizer: Mutex::new(Normalizer::new(longmem_core::config::DEFAULT_NORMALIZER_OFFSET_MS)),
            buffer: Mutex::new(ShortTermBuffer::new(token_budget)),
            topic_counter: Mutex::new(0),
            store,
            chat,
            embedder: CachingEmbedder::new(embedder),
            config,
            stats: Mutex::new(TokenStatistics::default()),
        }
    }

    /// Normalize and buffer `messages`. Extraction fires when `force_extract`
    /// is set or the buffer's token budget is reached; topic segmentation is
    /// a stub, so one flush is always rendered as one segment.
    pub async fn add_memory(&self, messages: Vec<InputMessage>, force_extract: bool) -> Result<AddMemoryOutcome> {
        let normalized = {
            let mut normalizer = self.normalizer.lock().unwrap();
            normalizer.normalize(messages)?
        };

        let ready = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(normalized)
        };

        if !(force_extract || ready) {
            return Ok(AddMemoryOutcome::default());
        }

        let segment = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.flush()
        };
        if segment.is_empty() {
            return Ok(AddMemoryOutcome::default());
        }

        let topic_index = {
            let mut counter = self.topic_counter.lock().unwrap();
            let value = *counter;
            *counter += 1;
            value
        };

        let extraction = extractor::extract_facts(
            &self.chat,
            &self.config.llm.model,
            self.config.llm.max_tokens,
            &segment,
            self.config.messages_use,
            topic_index,
        )
        .await;

        let extraction = match extraction {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "extractor call failed, treating segment as zero facts");
                return Ok(AddMemoryOutcome {
                    facts_created: 0,
                    extraction_ran: true,
                    raw_prompt: None,
                    raw_response: None,
                });
            }
        };

        self.record_extraction_usage(&extraction);

        let facts_created = self.synthesize_and_store(&segment, &extraction).await?;

        Ok(AddMemoryOutcome {
            facts_created,
            extraction_ran: true,
            raw_prompt: Some(extraction.raw_prompt),
            raw_response: Some(extraction.raw_response),
        })
    }

    async fn synthesize_and_store(&self, segment: &[NormalizedMessage], extraction: &ExtractionResult) -> Result<usize> {
        if extraction.facts.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = extraction.facts.iter().map(|f| f.fact.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            // Dimension mismatch is a fatal configuration error (§7 kind 5);
            // everything else (network/HTTP failure) is upstream-unavailable
            // (§7 kind 2) and must not abort the enclosing add_memory call.
            Err(err @ longmem_llm::LlmError::DimensionMismatch { .. }) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "embedder call failed, treating as zero facts");
                return Ok(0);
            }
        };
        {
            let usage = self.embedder.usage();
            let mut stats = self.stats.lock().unwrap();
            stats.embedding.calls = usage.calls;
            stats.embedding.tokens = usage.tokens;
        }

        let mut created = 0;
        for (fact, embedding) in extraction.facts.iter().zip(embeddings.into_iter()) {
            let source = segment
                .iter()
                .find(|m| (m.sequence_number / 2) as i64 == fact.source_id);

            let record = match source {
                Some(message) => FactRecord {
                    id: Uuid::new_v4().to_string(),
                    time_stamp: message.time_stamp.clone(),
                    float_time_stamp: message.float_time_stamp,
                    weekday: message.weekday.clone(),
                    category: String::new(),
                    subcategory: String::new(),
                    memory_class: String::new(),
                    memory: fact.fact.clone(),
                    original_memory: fact.fact.clone(),
                    compressed_memory: None,
                    topic_id: None,
                    topic_summary: String::new(),
                    speaker_id: message.role.clone(),
                    speaker_name: message.role.clone(),
                    hit_time: 0,
                    update_queue: Vec::new(),
                    created_at: Utc::now().to_rfc3339(),
                },
                None => FactRecord {
                    id: Uuid::new_v4().to_string(),
                    time_stamp: Utc::now().to_rfc3339(),
                    float_time_stamp: Utc::now().timestamp() as f64,
                    weekday: String::new(),
                    category: String::new(),
                    subcategory: String::new(),
                    memory_class: String::new(),
                    memory: fact.fact.clone(),
                    original_memory: fact.fact.clone(),
                    compressed_memory: None,
                    topic_id: None,
                    topic_summary: String::new(),
                    speaker_id: String::new(),
                    speaker_name: String::new(),
                    hit_time: 0,
                    update_queue: Vec::new(),
                    created_at: Utc::now().to_rfc3339(),
                },
            };

            self.store.insert(&record, &embedding)?;
            created += 1;
        }

        Ok(created)
    }

    fn record_extraction_usage(&self, extraction: &ExtractionResult) {
        let mut stats = self.stats.lock().unwrap();
        stats.add_memory.calls += 1;
        stats.add_memory.prompt_tokens += extraction.usage.prompt_tokens as u64;
        stats.add_memory.completion_tokens += extraction.usage.completion_tokens as u64;
        stats.add_memory.total_tokens += extraction.usage.total_tokens as u64;
    }

    /// §4.6 — embed the query, search the store, format hits.
    pub async fn retrieve(&self, query: &str, k: usize, filters: Filters) -> Result<String> {
        let out = retriever::retrieve(&self.embedder, &self.store, query, k, &filters).await?;
        let usage = self.embedder.usage();
        let mut stats = self.stats.lock().unwrap();
        stats.embedding.calls = usage.calls;
        stats.embedding.tokens = usage.tokens;
        Ok(out)
    }

    /// Consolidation phase 1.
    pub fn construct_update_queue_all_entries(&self, top_k: usize, keep_top_n: usize) -> Result<()> {
        consolidator::construct_update_queue_all_entries(&self.store, top_k, keep_top_n)
    }

    /// Consolidation phase 2.
    pub async fn offline_update_all_entries(&self, score_threshold: f64) -> Result<()> {
        let usage = consolidator::offline_update_all_entries(
            &self.store,
            &self.chat,
            &self.config.llm.model,
            self.config.llm.max_tokens,
            score_threshold,
        )
        .await?;

        let mut stats = self.stats.lock().unwrap();
        stats.update.calls += usage.calls;
        stats.update.prompt_tokens += usage.prompt_tokens;
        stats.update.completion_tokens += usage.completion_tokens;
        stats.update.total_tokens += usage.total_tokens;
        Ok(())
    }

    pub fn get_token_statistics(&self) -> TokenStatistics {
        *self.stats.lock().unwrap()
    }

    /// Direct access to the fact store, for hosts that need `count`/`get`
    /// without going through the facade (e.g. audit tooling).
    pub fn store(&self) -> &FactStore {
        &self.store
    }

    /// Apply a patch that bumps a record's hit counter. `hitTime` is
    /// monotonically non-decreasing (§3 invariant 5); callers are expected
    /// to pass a value ≥ the record's current one.
    pub fn bump_hit_time(&self, id: &str, hit_time: u64) -> Result<()> {
        self.store.update(
            id,
            &FactPatch {
                hit_time: Some(hit_time),
                ..Default::default()
            },
            None,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use longmem_core::config::{EmbedderConfig, LlmConfig, RoleFilter, StoreConfig};
    use longmem_llm::{ChatRequest, ChatResponse, ChatUsage, EmbeddingUsage};
    use std::sync::Mutex as StdMutex;

    fn test_config(messages_use: RoleFilter) -> EngineConfig {
        EngineConfig {
            messages_use,
            metadata_generate: true,
            text_summary: false,
            llm: LlmConfig {
                api_key: "test".to_string(),
                base_url: "http://localhost".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_tokens: 256,
            },
            embedder: EmbedderConfig {
                api_key: "test".to_string(),
                base_url: "http://localhost".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimensions: 2,
            },
            retrieve_strategy: Default::default(),
            update: Default::default(),
            store: StoreConfig::default(),
            log_level: None,
        }
    }

    fn input(role: &str, content: &str) -> InputMessage {
        InputMessage {
            role: role.to_string(),
            content: content.to_string(),
            time_stamp: "2024/01/15 (Mon) 10:00".to_string(),
        }
    }

    struct CapturingChat {
        reply: String,
        last_prompt: StdMutex<Option<String>>,
    }

    #[async_trait]
    impl ChatProvider for CapturingChat {
        async fn send(&self, req: &ChatRequest) -> longmem_llm::Result<ChatResponse> {
            let user_prompt = req
                .messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone());
            *self.last_prompt.lock().unwrap() = user_prompt;
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: ChatUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    struct FailingEmbed;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbed {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> longmem_llm::Result<(Vec<Vec<f32>>, EmbeddingUsage)> {
            Err(longmem_llm::LlmError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            })
        }
    }

    struct FixedEmbed;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbed {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> longmem_llm::Result<(Vec<Vec<f32>>, EmbeddingUsage)> {
            Ok((
                texts.iter().map(|_| vec![1.0, 0.0]).collect(),
                EmbeddingUsage { total_tokens: 4 },
            ))
        }
    }

    #[tokio::test]
    async fn single_turn_insert_creates_one_fact_record() {
        let chat = CapturingChat {
            reply: r#"{"data":[{"source_id":0,"fact":"likes tea"}]}"#.to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::Hybrid), chat, FixedEmbed, store);

        let outcome = engine.add_memory(vec![input("user", "I like tea")], true).await.unwrap();

        assert_eq!(outcome.facts_created, 1);
        assert!(outcome.extraction_ran);
        assert_eq!(engine.store().count().unwrap(), 1);

        let stats = engine.get_token_statistics();
        assert_eq!(stats.add_memory.calls, 1);
        assert_eq!(stats.add_memory.total_tokens, 15);
    }

    #[tokio::test]
    async fn role_filter_excludes_assistant_messages_from_the_rendered_prompt() {
        let chat = CapturingChat {
            reply: r#"{"data":[]}"#.to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::UserOnly), chat, FixedEmbed, store);

        engine
            .add_memory(
                vec![input("user", "hi from user"), input("assistant", "hi from assistant")],
                true,
            )
            .await
            .unwrap();

        let prompt = engine.chat.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("hi from user"));
        assert!(!prompt.contains("hi from assistant"));
    }

    #[tokio::test]
    async fn below_trigger_threshold_does_not_extract() {
        let chat = CapturingChat {
            reply: r#"{"data":[]}"#.to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::Hybrid), chat, FixedEmbed, store);

        let outcome = engine.add_memory(vec![input("user", "hi")], false).await.unwrap();
        assert!(!outcome.extraction_ran);
        assert_eq!(engine.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn retrieve_formats_stored_facts() {
        let chat = CapturingChat {
            reply: r#"{"data":[{"source_id":0,"fact":"likes tea"}]}"#.to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::Hybrid), chat, FixedEmbed, store);
        engine.add_memory(vec![input("user", "I like tea")], true).await.unwrap();

        let out = engine.retrieve("tea", 5, Filters::default()).await.unwrap();
        assert!(out.contains("likes tea"));
    }

    #[tokio::test]
    async fn malformed_extractor_reply_yields_zero_facts_and_does_not_abort() {
        let chat = CapturingChat {
            reply: "not json".to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::Hybrid), chat, FixedEmbed, store);

        let outcome = engine.add_memory(vec![input("user", "hi")], true).await.unwrap();
        assert_eq!(outcome.facts_created, 0);
        assert!(outcome.extraction_ran);
    }

    #[tokio::test]
    async fn embedder_failure_yields_zero_facts_and_does_not_abort() {
        let chat = CapturingChat {
            reply: r#"{"data":[{"source_id":0,"fact":"likes tea"}]}"#.to_string(),
            last_prompt: StdMutex::new(None),
        };
        let store = FactStore::open_in_memory(2).unwrap();
        let engine = Engine::new(test_config(RoleFilter::Hybrid), chat, FailingEmbed, store);

        let outcome = engine.add_memory(vec![input("user", "I like tea")], true).await.unwrap();
        assert_eq!(outcome.facts_created, 0);
        assert!(outcome.extraction_ran, "extraction itself succeeded, only embedding failed");
        assert_eq!(engine.store().count().unwrap(), 0);
    }
}
