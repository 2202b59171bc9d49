use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingUsage};

/// Accumulated embedder usage: number of remote calls made and total
/// tokens reported by the provider across the caching embedder's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedderUsageTotals {
    pub calls: u64,
    pub tokens: u64,
}

/// Wraps an [`EmbeddingProvider`] with a lossless text→vector cache.
///
/// A cache hit never calls the remote provider; misses are batched into a
/// single call per `embed_batch` invocation. The cache is process-local
/// and keyed on the exact input text — no normalization is applied.
pub struct CachingEmbedder<P: EmbeddingProvider> {
    inner: P,
    cache: DashMap<String, Vec<f32>>,
    usage: Mutex<EmbedderUsageTotals>,
}

impl<P: EmbeddingProvider> CachingEmbedder<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            usage: Mutex::new(EmbedderUsageTotals::default()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn usage(&self) -> EmbedderUsageTotals {
        *self.usage.lock().unwrap()
    }

    /// Clear the cache. The embedder's cache may be dropped at any time
    /// per the shared-resource policy; nothing in the engine depends on
    /// cache contents surviving a clear.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Embed a single text, via the batch path.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(vectors.into_iter().next().unwrap_or_default())
    }

    /// Embed a batch of texts. Cache hits are filled in without a remote
    /// call; misses are sent to the provider in one request and the
    /// results are cached before returning.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(cached) = self.cache.get(text) {
                results.push(Some(cached.clone()));
            } else {
                results.push(None);
                miss_indices.push(i);
                miss_texts.push(text.clone());
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                hits = texts.len() - miss_texts.len(),
                misses = miss_texts.len(),
                "embedding cache lookup"
            );
            let (vectors, usage) = self.inner.embed_batch(&miss_texts).await?;
            {
                let mut totals = self.usage.lock().unwrap();
                totals.calls += 1;
                totals.tokens += usage.total_tokens as u64;
            }
            for (idx, (text, vector)) in miss_indices.iter().zip(miss_texts.iter().zip(vectors)) {
                self.cache.insert(text.clone(), vector.clone());
                results[*idx] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|r| r.unwrap_or_default()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as _async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[_async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, EmbeddingUsage)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let vectors = texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect();
            Ok((vectors, EmbeddingUsage { total_tokens: 3 }))
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_remote_call() {
        let embedder = CachingEmbedder::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });

        let first = embedder.embed("x").await.unwrap();
        let second = embedder.embed("x").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_texts_each_trigger_a_call() {
        let embedder = CachingEmbedder::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });

        embedder.embed("a").await.unwrap();
        embedder.embed("b").await.unwrap();

        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(embedder.usage().calls, 2);
    }
}
