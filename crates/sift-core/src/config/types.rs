use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sift_index::BuilderConfig;
use sift_index::chunker::ChunkerConfig;
use sift_llm::RetryPolicy;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_engine() -> String {
    "text-embedding-ada-002".into()
}

fn default_batch_size() -> usize {
    sift_index::builder::EMBED_BATCH_SIZE
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    20_000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Engine id sent to the provider and recorded in the index manifest.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<Secret>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            engine: default_engine(),
            api_key: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

fn default_embeddings_dir() -> PathBuf {
    PathBuf::from("./embeddings")
}

fn default_window_tokens() -> usize {
    256
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_embeddings_dir")]
    pub embeddings_dir: PathBuf,
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embeddings_dir: default_embeddings_dir(),
            window_tokens: default_window_tokens(),
        }
    }
}

fn default_code_count() -> usize {
    5
}

fn default_markdown_count() -> usize {
    2
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_code_count")]
    pub code_count: usize,
    #[serde(default = "default_markdown_count")]
    pub markdown_count: usize,
    /// Query embeddings kept in the LRU cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Budget for one retrieval call, embedding and retries included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            code_count: default_code_count(),
            markdown_count: default_markdown_count(),
            cache_capacity: default_cache_capacity(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_delta() -> f32 {
    sift_index::classifier::DEFAULT_DELTA
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_delta")]
    pub delta: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            delta: default_delta(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            batch_size: self.embedding.batch_size,
            concurrency: self.embedding.concurrency,
            chunker: ChunkerConfig {
                window_tokens: self.index.window_tokens,
                ..ChunkerConfig::default()
            },
        }
    }
}
