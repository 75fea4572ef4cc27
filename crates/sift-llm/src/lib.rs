//! Embedding provider abstraction: batching, retry with backoff, response reordering and
//! query caching.

pub mod cache;
pub mod client;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use cache::{EmbeddingCache, QueryEmbedder};
pub use client::{EmbeddingClient, MAX_BATCH_SIZE};
pub use error::LlmError;
pub use provider::{EmbeddingProvider, IndexedEmbedding};
pub use retry::RetryPolicy;
