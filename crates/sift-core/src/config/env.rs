use std::str::FromStr;

use super::{Config, Secret};

/// Parse `key` from the environment. Unset yields `None`; an unparsable value is
/// logged and also yields `None`.
pub(crate) fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    let parsed = v.parse().ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {key} value: {v}");
    }
    parsed
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_embedding();
        self.apply_env_overrides_retrieval();
    }

    fn apply_env_overrides_embedding(&mut self) {
        if let Ok(v) = std::env::var("SIFT_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SIFT_EMBEDDING_ENGINE") {
            self.embedding.engine = v;
        }
        if let Ok(v) = std::env::var("SIFT_OPENAI_API_KEY")
            && !v.is_empty()
        {
            self.embedding.api_key = Some(Secret::new(v));
        }
        if let Some(n) = env_parsed("SIFT_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = n;
        }
        if let Some(n) = env_parsed("SIFT_EMBEDDING_CONCURRENCY") {
            self.embedding.concurrency = n;
        }
        if let Some(n) = env_parsed("SIFT_EMBEDDING_MAX_ATTEMPTS") {
            self.embedding.max_attempts = n;
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Ok(v) = std::env::var("SIFT_EMBEDDINGS_DIR") {
            self.index.embeddings_dir = v.into();
        }
        if let Some(n) = env_parsed("SIFT_INDEX_WINDOW_TOKENS") {
            self.index.window_tokens = n;
        }
        if let Some(n) = env_parsed("SIFT_SEARCH_CODE_COUNT") {
            self.search.code_count = n;
        }
        if let Some(n) = env_parsed("SIFT_SEARCH_MARKDOWN_COUNT") {
            self.search.markdown_count = n;
        }
        if let Some(n) = env_parsed("SIFT_SEARCH_CACHE_CAPACITY") {
            self.search.cache_capacity = n;
        }
        if let Some(secs) = env_parsed("SIFT_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = secs;
        }
        if let Some(delta) = env_parsed("SIFT_CLASSIFIER_DELTA") {
            self.classifier.delta = delta;
        }
    }
}
