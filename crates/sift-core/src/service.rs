//! Retrieval facade: index building, index loading, search, and context-need checks.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sift_index::classifier::prefilter;
use sift_index::{
    BuildReport, BuilderConfig, ContextClassifier, ContextDecision, IndexBuilder, IndexError,
    ReferenceCorpus, SearchIndex, SearchResults,
};
use sift_llm::{EmbeddingCache, EmbeddingClient, EmbeddingProvider, QueryEmbedder};
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::{Result, ServiceError};

/// Shared entry point for collaborators such as the CLI or an HTTP layer.
///
/// One embedding client, query cache and reference corpus serve every call. The
/// reference corpus is embedded on the first query that reaches the similarity stage.
pub struct Retrieval<P> {
    client: Arc<EmbeddingClient<P>>,
    embedder: QueryEmbedder<P>,
    classifier: OnceCell<ContextClassifier>,
    builder_config: BuilderConfig,
    delta: f32,
    timeout: Duration,
}

impl<P: EmbeddingProvider> Retrieval<P> {
    #[must_use]
    pub fn new(provider: P, config: &Config) -> Self {
        let client = Arc::new(
            EmbeddingClient::new(provider).with_retry(config.embedding.retry_policy()),
        );
        let capacity = NonZeroUsize::new(config.search.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let embedder = QueryEmbedder::new(
            Arc::clone(&client),
            Arc::new(EmbeddingCache::new(capacity)),
            config.embedding.engine.clone(),
        );
        Self {
            client,
            embedder,
            classifier: OnceCell::new(),
            builder_config: config.builder_config(),
            delta: config.classifier.delta,
            timeout: config.search.timeout(),
        }
    }

    /// Use a prepared classifier instead of embedding the built-in reference corpus.
    #[must_use]
    pub fn with_classifier(self, classifier: ContextClassifier) -> Self {
        Self {
            classifier: OnceCell::new_with(Some(classifier)),
            ..self
        }
    }

    #[must_use]
    pub fn embedder(&self) -> &QueryEmbedder<P> {
        &self.embedder
    }

    /// Chunk, embed and publish `codebase_path`. Not subject to the query timeout.
    ///
    /// # Errors
    ///
    /// Returns the builder's error; the previously published index stays in place.
    pub async fn build_index(
        &self,
        codebase_id: &str,
        codebase_path: &Path,
        output_dir: &Path,
    ) -> Result<BuildReport> {
        let builder = IndexBuilder::new(
            Arc::clone(&self.client),
            self.embedder.engine_id(),
            self.builder_config.clone(),
        );
        Ok(builder.build(codebase_id, codebase_path, output_dir).await?)
    }

    /// # Errors
    ///
    /// Returns `IndexError::Unavailable` if the codebase has no readable index.
    pub fn load_index(&self, codebase_id: &str, embeddings_dir: &Path) -> Result<SearchIndex> {
        Ok(SearchIndex::load(codebase_id, embeddings_dir)?)
    }

    /// # Errors
    ///
    /// Returns `Timeout` if the call exceeds the configured budget, otherwise the
    /// search error.
    pub async fn search(
        &self,
        index: &SearchIndex,
        query: &str,
        code_count: usize,
        markdown_count: usize,
    ) -> Result<SearchResults> {
        self.within(
            "search",
            index.search(&self.embedder, query, code_count, markdown_count),
        )
        .await
    }

    /// Classify `query`, reporting which stage decided.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or the embedding error from the similarity stage.
    pub async fn classify(&self, query: &str) -> Result<ContextDecision> {
        if let Some(decision) = prefilter(query) {
            return Ok(decision);
        }
        self.within("classify", async {
            let classifier = self
                .classifier
                .get_or_try_init(|| async {
                    let corpus = ReferenceCorpus::embed_defaults(&self.embedder).await?;
                    tracing::info!("reference corpus ready");
                    Ok::<_, IndexError>(
                        ContextClassifier::new(Arc::new(corpus)).with_delta(self.delta),
                    )
                })
                .await?;
            classifier.classify(&self.embedder, query).await
        })
        .await
    }

    /// # Errors
    ///
    /// See [`Retrieval::classify`].
    pub async fn needs_additional_context(&self, query: &str) -> Result<bool> {
        Ok(self.classify(query).await?.needs_context())
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = std::result::Result<T, IndexError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.timeout, "retrieval timed out");
                Err(ServiceError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}
