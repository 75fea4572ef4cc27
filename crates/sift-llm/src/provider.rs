use std::future::Future;

use serde::Deserialize;

use crate::error::LlmError;

/// One row of a provider response, tagged with the position of the input it belongs to.
///
/// Providers do not promise to answer in request order, so the index is the only
/// reliable link back to the input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Raw transport to an embedding backend.
///
/// Implementations send exactly one request per call and return rows in whatever
/// order the backend produced them. Input normalization, batching limits, retry and
/// reordering live in [`crate::client::EmbeddingClient`].
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `input` with the engine identified by `engine_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    fn embed_raw(
        &self,
        input: &[String],
        engine_id: &str,
    ) -> impl Future<Output = Result<Vec<IndexedEmbedding>, LlmError>> + Send;

    fn name(&self) -> &'static str;
}
