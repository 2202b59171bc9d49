use longmem_llm::CachingEmbedder;
use longmem_llm::EmbeddingProvider;
use longmem_store::{FactStore, Filters};

use crate::error::Result;

/// Embed `query_text`, call the store's cosine search, and format the hits
/// one per line. Order is preserved from `search`; an empty result yields
/// an empty string.
pub async fn retrieve<P: EmbeddingProvider>(
    embedder: &CachingEmbedder<P>,
    store: &FactStore,
    query_text: &str,
    k: usize,
    filters: &Filters,
) -> Result<String> {
    let query_vector = embedder.embed(query_text).await?;
    let hits = store.search(&query_vector, k, filters)?;
    let lines: Vec<String> = hits
        .into_iter()
        .map(|hit| format!("{} {} {}", hit.record.time_stamp, hit.record.weekday, hit.record.memory))
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use longmem_llm::EmbeddingUsage;
    use longmem_store::FactRecord;

    struct IdentityEmbedder;

    #[async_trait]
    impl EmbeddingProvider for IdentityEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> longmem_llm::Result<(Vec<Vec<f32>>, EmbeddingUsage)> {
            Ok((texts.iter().map(|_| vec![1.0, 0.0]).collect(), EmbeddingUsage::default()))
        }
    }

    fn record(id: &str, memory: &str) -> FactRecord {
        FactRecord {
            id: id.to_string(),
            time_stamp: "2024-01-15T10:00:00Z".to_string(),
            float_time_stamp: 100.0,
            weekday: "Mon".to_string(),
            category: String::new(),
            subcategory: String::new(),
            memory_class: String::new(),
            memory: memory.to_string(),
            original_memory: memory.to_string(),
            compressed_memory: None,
            topic_id: None,
            topic_summary: String::new(),
            speaker_id: String::new(),
            speaker_name: String::new(),
            hit_time: 0,
            update_queue: Vec::new(),
            created_at: "2024-01-15T10:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_string() {
        let store = FactStore::open_in_memory(2).unwrap();
        let embedder = CachingEmbedder::new(IdentityEmbedder);
        let out = retrieve(&embedder, &store, "anything", 5, &Filters::default()).await.unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn formats_one_line_per_hit() {
        let store = FactStore::open_in_memory(2).unwrap();
        store.insert(&record("a", "likes tea"), &[1.0, 0.0]).unwrap();
        let embedder = CachingEmbedder::new(IdentityEmbedder);
        let out = retrieve(&embedder, &store, "tea preference", 5, &Filters::default()).await.unwrap();
        assert_eq!(out, "2024-01-15T10:00:00Z Mon likes tea");
    }
}
