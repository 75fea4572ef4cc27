//! Test-only mock embedding provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, IndexedEmbedding};

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension` buckets and the
/// result is L2-normalized, so texts sharing words score higher under inner product.
/// Specific texts can be pinned to fixed vectors with [`MockEmbedder::with_vector`].
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimension: usize,
    overrides: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    calls: Arc<AtomicUsize>,
    texts_seen: Arc<AtomicUsize>,
    /// Return rows in reverse order to exercise response reordering.
    pub reverse_response: bool,
    /// Number of leading calls answered with `RateLimited`.
    pub transient_failures: Arc<AtomicUsize>,
    /// Fail every call with a non-transient error.
    pub fail_always: bool,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimension: 64,
            overrides: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            texts_seen: Arc::new(AtomicUsize::new(0)),
            reverse_response: false,
            transient_failures: Arc::new(AtomicUsize::new(0)),
            fail_always: false,
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_always: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reversed_response(mut self) -> Self {
        self.reverse_response = true;
        self
    }

    #[must_use]
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Pin `text` (after newline normalization) to `vector`.
    #[must_use]
    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        if let Ok(mut map) = self.overrides.lock() {
            map.insert(text.replace('\n', " "), vector);
        }
        self
    }

    /// Number of `embed_raw` calls made, including failed ones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts successfully embedded.
    #[must_use]
    pub fn texts_seen(&self) -> usize {
        self.texts_seen.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Ok(map) = self.overrides.lock()
            && let Some(v) = map.get(text)
        {
            return v.clone();
        }
        hashed_bag_of_words(text, self.dimension)
    }
}

fn hashed_bag_of_words(text: &str, dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; dimension.max(1)];
    let len = v.len();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let bucket = fnv1a(&token.to_lowercase()) % len as u64;
        #[allow(clippy::cast_possible_truncation)]
        let slot = &mut v[bucket as usize];
        *slot += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed_raw(
        &self,
        input: &[String],
        _engine_id: &str,
    ) -> Result<Vec<IndexedEmbedding>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_always {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LlmError::RateLimited);
        }

        let mut rows: Vec<IndexedEmbedding> = input
            .iter()
            .enumerate()
            .map(|(index, text)| IndexedEmbedding {
                index,
                embedding: self.vector_for(text),
            })
            .collect();
        if self.reverse_response {
            rows.reverse();
        }
        self.texts_seen.fetch_add(input.len(), Ordering::SeqCst);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
