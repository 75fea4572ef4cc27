//! Order-preserving batch embedding on top of a raw [`EmbeddingProvider`].

use crate::error::{LlmError, Result};
use crate::provider::{EmbeddingProvider, IndexedEmbedding};
use crate::retry::RetryPolicy;

/// Hard upper bound on texts per provider request.
pub const MAX_BATCH_SIZE: usize = 2048;

/// Wraps a provider with input normalization, retry, and response reordering.
#[derive(Debug)]
pub struct EmbeddingClient<P> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: EmbeddingProvider> EmbeddingClient<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Embed `texts` with `engine_id`; position `i` of the output belongs to `texts[i]`.
    ///
    /// # Errors
    ///
    /// Returns `BatchTooLarge` for more than [`MAX_BATCH_SIZE`] inputs, the provider's
    /// error once retries are exhausted, or `MalformedResponse` / `DimensionMismatch`
    /// if the response cannot be mapped back onto the inputs.
    pub async fn embed(&self, texts: &[String], engine_id: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > MAX_BATCH_SIZE {
            return Err(LlmError::BatchTooLarge {
                len: texts.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let input: Vec<String> = texts.iter().map(|t| normalize_input(t)).collect();
        let input = &input;
        let provider = &self.provider;

        let rows = self
            .retry
            .run(provider.name(), move || provider.embed_raw(input, engine_id))
            .await?;

        tracing::debug!(
            provider = provider.name(),
            engine = engine_id,
            count = texts.len(),
            "embedded batch"
        );
        restore_order(rows, texts.len())
    }
}

/// Newlines degrade embedding quality for some engines; they are sent as spaces.
#[must_use]
pub fn normalize_input(text: &str) -> String {
    text.replace('\n', " ")
}

/// Sort provider rows by their declared index and check the result covers every input
/// exactly once with a single dimensionality.
pub(crate) fn restore_order(
    mut rows: Vec<IndexedEmbedding>,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    if rows.len() != expected {
        return Err(LlmError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            rows.len()
        )));
    }

    rows.sort_by_key(|r| r.index);
    for (pos, row) in rows.iter().enumerate() {
        if row.index != pos {
            return Err(LlmError::MalformedResponse(format!(
                "missing or duplicated index {pos}"
            )));
        }
    }

    let dimension = rows[0].embedding.len();
    if dimension == 0 {
        return Err(LlmError::MalformedResponse("zero-length embedding".into()));
    }
    if let Some(bad) = rows.iter().find(|r| r.embedding.len() != dimension) {
        return Err(LlmError::DimensionMismatch {
            expected: dimension,
            got: bad.embedding.len(),
        });
    }

    Ok(rows.into_iter().map(|r| r.embedding).collect())
}
