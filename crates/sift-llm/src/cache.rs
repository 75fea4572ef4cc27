//! Memoized query embeddings.
//!
//! Entries are keyed by `(engine, text)`: switching the embedding engine (and with it,
//! possibly the dimensionality) never serves a vector produced by the old one.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::client::EmbeddingClient;
use crate::error::{LlmError, Result};
use crate::provider::EmbeddingProvider;

const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(1024).unwrap();

type CacheKey = (String, String);

/// Bounded LRU cache of query embeddings, shared between search and classification.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, Arc<[f32]>>>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn get(&self, engine_id: &str, text: &str) -> Option<Arc<[f32]>> {
        let key = (engine_id.to_owned(), text.to_owned());
        self.entries.lock().ok()?.get(&key).cloned()
    }

    pub fn insert(&self, engine_id: &str, text: &str, vector: Arc<[f32]>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put((engine_id.to_owned(), text.to_owned()), vector);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embeds single queries through a shared client and cache, bound to one engine.
pub struct QueryEmbedder<P> {
    client: Arc<EmbeddingClient<P>>,
    cache: Arc<EmbeddingCache>,
    engine_id: String,
}

impl<P> Clone for QueryEmbedder<P> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            cache: Arc::clone(&self.cache),
            engine_id: self.engine_id.clone(),
        }
    }
}

impl<P> std::fmt::Debug for QueryEmbedder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEmbedder")
            .field("engine_id", &self.engine_id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<P: EmbeddingProvider> QueryEmbedder<P> {
    #[must_use]
    pub fn new(
        client: Arc<EmbeddingClient<P>>,
        cache: Arc<EmbeddingCache>,
        engine_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache,
            engine_id: engine_id.into(),
        }
    }

    #[must_use]
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    #[must_use]
    pub fn client(&self) -> &EmbeddingClient<P> {
        &self.client
    }

    /// Embed one query, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Propagates the embedding client's error; failures are not cached.
    pub async fn embed_query(&self, query: &str) -> Result<Arc<[f32]>> {
        if let Some(hit) = self.cache.get(&self.engine_id, query) {
            tracing::trace!(engine = %self.engine_id, "query embedding cache hit");
            return Ok(hit);
        }

        let mut vectors = self
            .client
            .embed(&[query.to_owned()], &self.engine_id)
            .await?;
        let vector: Arc<[f32]> = vectors
            .pop()
            .ok_or(LlmError::EmptyResponse {
                provider: self.client.provider().name(),
            })?
            .into();

        self.cache.insert(&self.engine_id, query, Arc::clone(&vector));
        Ok(vector)
    }

    /// Embed several texts in one uncached batch.
    ///
    /// # Errors
    ///
    /// Propagates the embedding client's error.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed(texts, &self.engine_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::provider::IndexedEmbedding;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        async fn embed_raw(&self, input: &[String], engine_id: &str) -> Result<Vec<IndexedEmbedding>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            #[allow(clippy::cast_precision_loss)]
            let rows = input
                .iter()
                .enumerate()
                .map(|(index, t)| IndexedEmbedding {
                    index,
                    embedding: vec![t.len() as f32, engine_id.len() as f32],
                })
                .collect();
            Ok(rows)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn embedder(cache: Arc<EmbeddingCache>, engine: &str) -> QueryEmbedder<CountingProvider> {
        QueryEmbedder::new(
            Arc::new(EmbeddingClient::new(CountingProvider::default())),
            cache,
            engine,
        )
    }

    #[tokio::test]
    async fn repeated_query_hits_cache() {
        let e = embedder(Arc::new(EmbeddingCache::default()), "engine");
        let first = e.embed_query("where is auth handled").await.unwrap();
        let second = e.embed_query("where is auth handled").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(e.client().provider().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_is_part_of_the_key() {
        let cache = Arc::new(EmbeddingCache::default());
        let a = embedder(Arc::clone(&cache), "small");
        let b = embedder(Arc::clone(&cache), "much-larger");

        let va = a.embed_query("q").await.unwrap();
        let vb = b.embed_query("q").await.unwrap();

        assert_ne!(va, vb);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn lru_evicts_least_recent() {
        let cache = EmbeddingCache::new(NonZeroUsize::new(2).unwrap());
        cache.insert("e", "a", Arc::from(vec![1.0]));
        cache.insert("e", "b", Arc::from(vec![2.0]));
        assert!(cache.get("e", "a").is_some());
        cache.insert("e", "c", Arc::from(vec![3.0]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("e", "b").is_none());
        assert!(cache.get("e", "a").is_some());
        assert!(cache.get("e", "c").is_some());
    }

    #[test]
    fn empty_cache() {
        let cache = EmbeddingCache::default();
        assert!(cache.is_empty());
        assert!(cache.get("e", "missing").is_none());
    }
}
