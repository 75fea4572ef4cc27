//! Decides whether a query needs retrieved codebase context before it is answered.
//!
//! Cheap string checks run first and can only answer "no context". Queries that
//! survive them are compared against two reference sets of example queries; the
//! classifier leans towards retrieval unless the "no context" set clearly wins.

use std::sync::{Arc, LazyLock};

use ndarray::{Array2, ArrayView1};
use regex::Regex;
use sift_llm::{EmbeddingProvider, QueryEmbedder};

use crate::error::{IndexError, Result};

/// Margin by which the "no context" similarity must beat the "needs context" one.
pub const DEFAULT_DELTA: f32 = 0.02;

/// Trimmed queries shorter than this never need context.
pub const MIN_QUERY_CHARS: usize = 15;

const OPT_OUT_PREFIX: &str = "general:";
const CODE_FENCE: &str = "```\n";

static NO_CONTEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(previous|above)\s+(message|answer|response|reply|snippet|code|text)\b",
        r"(?i)\b(translate|refactor|explain|rewrite|fix|simplify|improve|optimi[sz]e|convert|summari[sz]e|shorten|reformat|clean\s+up|change|try)\s+(this|that|it|again)\b",
        r"(?i)^\s*(i\s+think\s+)?(this|that|it)\s+(is|was|looks|seems)\s+(wrong|right|good|bad|great|correct|incorrect|better|worse|broken|fine|perfect)\b",
        r"(?i)^\s*(yes|no|yep|yeah|nope|ok|okay|cool|thanks|thank\s+you|great|nice|sure|perfect|awesome|got\s+it)\b[\s\w,']{0,30}[.!?]*\s*$",
    ]
    .iter()
    .map(|s| Regex::new(s).unwrap())
    .collect()
});

/// Example queries that depend on knowledge of a specific codebase.
pub const DEFAULT_NEEDS_CONTEXT: &[&str] = &[
    "Where is the authentication middleware configured?",
    "How does the billing service calculate invoice totals?",
    "Which function handles retries when the upload to storage fails?",
    "What does the UserRepository class do in our backend?",
    "How are database migrations applied when the server starts?",
    "Where do we define the routes for the admin API?",
    "Why does the search endpoint return duplicate results?",
    "What environment variables does the worker process read?",
    "How is the cache invalidated after a user updates their profile?",
    "Which tests cover the payment webhook handler?",
];

/// Example queries answerable without looking at any codebase.
pub const DEFAULT_NO_CONTEXT: &[&str] = &[
    "What is the difference between a process and a thread?",
    "Write a function that reverses a linked list in Python.",
    "Explain how quicksort works and its time complexity.",
    "What is a closure in JavaScript?",
    "How do I center a div with CSS flexbox?",
    "What are the SOLID principles of object oriented design?",
    "Write a regular expression that matches an email address.",
    "What is the difference between TCP and UDP?",
    "How does garbage collection work in Java?",
    "Give me an example of a binary search in Go.",
];

/// Which stage of the classifier produced the decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextDecision {
    /// Query starts with the `general:` prefix.
    OptOut,
    TooShort,
    /// Query brings its own fenced code block.
    InlineCode,
    /// Matched the heuristic pattern at this index.
    Heuristic(usize),
    /// Decided by reference-set similarity.
    Similarity {
        needs_context: bool,
        needs_score: f32,
        no_context_score: f32,
    },
}

impl ContextDecision {
    #[must_use]
    pub fn needs_context(self) -> bool {
        matches!(
            self,
            Self::Similarity {
                needs_context: true,
                ..
            }
        )
    }
}

/// Run the string-only stages. `None` means the query has to be embedded.
#[must_use]
pub fn prefilter(query: &str) -> Option<ContextDecision> {
    let trimmed = query.trim();
    if trimmed
        .get(..OPT_OUT_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(OPT_OUT_PREFIX))
    {
        return Some(ContextDecision::OptOut);
    }
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Some(ContextDecision::TooShort);
    }
    if query.contains(CODE_FENCE) {
        return Some(ContextDecision::InlineCode);
    }
    NO_CONTEXT_PATTERNS
        .iter()
        .position(|re| re.is_match(trimmed))
        .map(ContextDecision::Heuristic)
}

/// Embedded example queries for both classes.
#[derive(Debug, Clone)]
pub struct ReferenceCorpus {
    needs_context: Array2<f32>,
    no_context: Array2<f32>,
}

impl ReferenceCorpus {
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the vectors are not all the same width.
    pub fn from_vectors(needs_context: Vec<Vec<f32>>, no_context: Vec<Vec<f32>>) -> Result<Self> {
        let needs_context = to_matrix(needs_context)?;
        let no_context = to_matrix(no_context)?;
        if !needs_context.is_empty()
            && !no_context.is_empty()
            && needs_context.ncols() != no_context.ncols()
        {
            return Err(IndexError::DimensionMismatch {
                expected: needs_context.ncols(),
                got: no_context.ncols(),
            });
        }
        Ok(Self {
            needs_context,
            no_context,
        })
    }

    /// Embed both example sets, one batched request per set.
    ///
    /// # Errors
    ///
    /// Propagates embedding errors.
    pub async fn embed<P: EmbeddingProvider>(
        embedder: &QueryEmbedder<P>,
        needs_context: &[String],
        no_context: &[String],
    ) -> Result<Self> {
        let needs = embedder.embed_many(needs_context).await?;
        let no = embedder.embed_many(no_context).await?;
        tracing::debug!(
            needs = needs.len(),
            no_context = no.len(),
            "reference corpus embedded"
        );
        Self::from_vectors(needs, no)
    }

    /// [`ReferenceCorpus::embed`] over [`DEFAULT_NEEDS_CONTEXT`] and [`DEFAULT_NO_CONTEXT`].
    ///
    /// # Errors
    ///
    /// Propagates embedding errors.
    pub async fn embed_defaults<P: EmbeddingProvider>(embedder: &QueryEmbedder<P>) -> Result<Self> {
        let owned = |set: &[&str]| set.iter().map(|&s| s.to_owned()).collect::<Vec<_>>();
        Self::embed(
            embedder,
            &owned(DEFAULT_NEEDS_CONTEXT),
            &owned(DEFAULT_NO_CONTEXT),
        )
        .await
    }

    /// Mean inner product of `query` with each set: `(needs, no_context)`.
    fn mean_scores(&self, query: &[f32]) -> Result<(f32, f32)> {
        Ok((
            mean_similarity(&self.needs_context, query)?,
            mean_similarity(&self.no_context, query)?,
        ))
    }
}

fn to_matrix(rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let width = rows.first().map_or(0, Vec::len);
    let height = rows.len();
    let mut flat = Vec::with_capacity(width * height);
    for row in rows {
        if row.len() != width {
            return Err(IndexError::DimensionMismatch {
                expected: width,
                got: row.len(),
            });
        }
        flat.extend(row);
    }
    Ok(Array2::from_shape_vec((height, width), flat)?)
}

fn mean_similarity(set: &Array2<f32>, query: &[f32]) -> Result<f32> {
    if set.nrows() == 0 {
        return Ok(0.0);
    }
    if set.ncols() != query.len() {
        return Err(IndexError::DimensionMismatch {
            expected: set.ncols(),
            got: query.len(),
        });
    }
    Ok(set.dot(&ArrayView1::from(query)).mean().unwrap_or(0.0))
}

/// Context-need classifier over a shared reference corpus.
#[derive(Debug, Clone)]
pub struct ContextClassifier {
    corpus: Arc<ReferenceCorpus>,
    delta: f32,
}

impl ContextClassifier {
    #[must_use]
    pub fn new(corpus: Arc<ReferenceCorpus>) -> Self {
        Self {
            corpus,
            delta: DEFAULT_DELTA,
        }
    }

    #[must_use]
    pub fn with_delta(mut self, delta: f32) -> Self {
        self.delta = delta;
        self
    }

    #[must_use]
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Run every stage in order and report which one decided.
    ///
    /// # Errors
    ///
    /// Only the similarity stage can fail, with the embedding error or a
    /// `DimensionMismatch` between query and corpus.
    pub async fn classify<P: EmbeddingProvider>(
        &self,
        embedder: &QueryEmbedder<P>,
        query: &str,
    ) -> Result<ContextDecision> {
        if let Some(decision) = prefilter(query) {
            tracing::debug!(?decision, "context need decided by prefilter");
            return Ok(decision);
        }

        let vector = embedder.embed_query(query.trim()).await?;
        let (needs_score, no_context_score) = self.corpus.mean_scores(&vector)?;
        let decision = ContextDecision::Similarity {
            needs_context: no_context_score - needs_score <= self.delta,
            needs_score,
            no_context_score,
        };
        tracing::debug!(?decision, "context need decided by similarity");
        Ok(decision)
    }

    /// # Errors
    ///
    /// See [`ContextClassifier::classify`].
    pub async fn needs_context<P: EmbeddingProvider>(
        &self,
        embedder: &QueryEmbedder<P>,
        query: &str,
    ) -> Result<bool> {
        Ok(self.classify(embedder, query).await?.needs_context())
    }
}
