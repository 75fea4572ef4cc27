//! Exact inner-product search over the code and markdown partitions of an index.

use std::path::Path;

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use sift_llm::{EmbeddingProvider, QueryEmbedder};

use crate::artifact::{Artifact, ArtifactStore, ChunkRecord};
use crate::error::{IndexError, Result};
use crate::languages::ContentClass;

/// A record with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub score: f32,
}

/// Hits per partition. `None` means the index holds no records of that class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub code: Option<Vec<SearchHit>>,
    pub markdown: Option<Vec<SearchHit>>,
}

/// Rows of one content class, in their original relative order.
#[derive(Debug, Clone)]
pub struct Partition {
    records: Vec<ChunkRecord>,
    vectors: Array2<f32>,
}

impl Partition {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// The `k` best rows by inner product, best first. Equal scores keep row order.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `query` is not as wide as the stored vectors.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.vectors.ncols() {
            return Err(IndexError::DimensionMismatch {
                expected: self.vectors.ncols(),
                got: query.len(),
            });
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(i, score)| SearchHit {
                record: self.records[i].clone(),
                score,
            })
            .collect())
    }
}

/// In-memory index for one codebase, split by content class.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    codebase_id: String,
    engine_id: Option<String>,
    code: Option<Partition>,
    markdown: Option<Partition>,
}

impl SearchIndex {
    /// Load the published artifacts for `codebase_id` from `embeddings_dir`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Unavailable` if the artifacts are missing or corrupt.
    pub fn load(codebase_id: &str, embeddings_dir: &Path) -> Result<Self> {
        let artifact = ArtifactStore::new(embeddings_dir, codebase_id).read()?;
        let index = Self::from_artifact(codebase_id, artifact);
        tracing::info!(
            codebase = codebase_id,
            code = index.code.as_ref().map_or(0, Partition::len),
            markdown = index.markdown.as_ref().map_or(0, Partition::len),
            "index loaded"
        );
        Ok(index)
    }

    #[must_use]
    pub fn from_artifact(codebase_id: &str, artifact: Artifact) -> Self {
        let Artifact {
            records,
            vectors,
            engine_id,
        } = artifact;

        let mut code_rows = Vec::new();
        let mut markdown_rows = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match ContentClass::of(&record.file_path) {
                ContentClass::Code => code_rows.push(i),
                ContentClass::Markdown => markdown_rows.push(i),
            }
        }

        let partition = |rows: &[usize]| {
            (!rows.is_empty()).then(|| Partition {
                records: rows.iter().map(|&i| records[i].clone()).collect(),
                vectors: vectors.select(Axis(0), rows),
            })
        };

        Self {
            codebase_id: codebase_id.to_owned(),
            code: partition(&code_rows),
            markdown: partition(&markdown_rows),
            engine_id,
        }
    }

    #[must_use]
    pub fn codebase_id(&self) -> &str {
        &self.codebase_id
    }

    /// Engine the index was built with; `None` for legacy artifacts.
    #[must_use]
    pub fn engine_id(&self) -> Option<&str> {
        self.engine_id.as_deref()
    }

    #[must_use]
    pub fn partition(&self, class: ContentClass) -> Option<&Partition> {
        match class {
            ContentClass::Code => self.code.as_ref(),
            ContentClass::Markdown => self.markdown.as_ref(),
        }
    }

    /// Rank both partitions against an already-embedded query.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the query width differs from the index.
    pub fn search_vector(
        &self,
        query: &[f32],
        code_count: usize,
        markdown_count: usize,
    ) -> Result<SearchResults> {
        Ok(SearchResults {
            code: self
                .code
                .as_ref()
                .map(|p| p.top_k(query, code_count))
                .transpose()?,
            markdown: self
                .markdown
                .as_ref()
                .map(|p| p.top_k(query, markdown_count))
                .transpose()?,
        })
    }

    /// Embed `query` and return the best `code_count` code hits and
    /// `markdown_count` markdown hits.
    ///
    /// No embedding request is made when both counts are zero or the index is empty.
    ///
    /// # Errors
    ///
    /// Returns `EngineMismatch` if the embedder's engine differs from the index's,
    /// the embedding error, or `DimensionMismatch`.
    pub async fn search<P: EmbeddingProvider>(
        &self,
        embedder: &QueryEmbedder<P>,
        query: &str,
        code_count: usize,
        markdown_count: usize,
    ) -> Result<SearchResults> {
        if let Some(index_engine) = &self.engine_id
            && index_engine != embedder.engine_id()
        {
            return Err(IndexError::EngineMismatch {
                index: index_engine.clone(),
                query: embedder.engine_id().to_owned(),
            });
        }

        let wants_code = code_count > 0 && self.code.is_some();
        let wants_markdown = markdown_count > 0 && self.markdown.is_some();
        if !wants_code && !wants_markdown {
            return self.search_vector(&[], 0, 0);
        }

        let vector = embedder.embed_query(query).await?;
        let results = self.search_vector(&vector, code_count, markdown_count)?;
        tracing::debug!(
            codebase = %self.codebase_id,
            code = results.code.as_ref().map_or(0, Vec::len),
            markdown = results.markdown.as_ref().map_or(0, Vec::len),
            "search complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::array;
    use sift_llm::mock::MockEmbedder;
    use sift_llm::{EmbeddingCache, EmbeddingClient};

    use super::*;

    fn record(path: &str, start: usize) -> ChunkRecord {
        ChunkRecord {
            file_path: path.into(),
            start,
            end: start + 1,
            text: format!("{path}#{start}"),
        }
    }

    fn index() -> SearchIndex {
        SearchIndex::from_artifact(
            "repo",
            Artifact {
                records: vec![
                    record("src/a.rs", 0),
                    record("README.md", 0),
                    record("src/b.rs", 0),
                    record("src/c.rs", 0),
                    record("docs/x.md", 0),
                ],
                vectors: array![
                    [1.0_f32, 0.0],
                    [0.0, 1.0],
                    [0.5, 0.5],
                    [0.9, 0.1],
                    [0.2, 0.8],
                ],
                engine_id: Some("mock".into()),
            },
        )
    }

    fn embedder(mock: MockEmbedder, engine: &str) -> QueryEmbedder<MockEmbedder> {
        QueryEmbedder::new(
            Arc::new(EmbeddingClient::new(mock)),
            Arc::new(EmbeddingCache::default()),
            engine,
        )
    }

    #[test]
    fn partitions_keep_relative_order() {
        let idx = index();
        let code: Vec<_> = idx
            .partition(ContentClass::Code)
            .unwrap()
            .records()
            .iter()
            .map(|r| r.file_path.as_str())
            .collect();
        assert_eq!(code, ["src/a.rs", "src/b.rs", "src/c.rs"]);
        assert_eq!(idx.partition(ContentClass::Markdown).unwrap().len(), 2);
    }

    #[test]
    fn ranks_by_inner_product() {
        let results = index().search_vector(&[1.0, 0.0], 2, 1).unwrap();
        let code: Vec<_> = results
            .code
            .unwrap()
            .into_iter()
            .map(|h| h.record.file_path)
            .collect();
        assert_eq!(code, ["src/a.rs", "src/c.rs"]);
        let markdown = results.markdown.unwrap();
        assert_eq!(markdown.len(), 1);
        assert_eq!(markdown[0].record.file_path, "docs/x.md");
        assert!((markdown[0].score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn k_larger_than_partition_returns_all() {
        let results = index().search_vector(&[0.0, 1.0], 10, 10).unwrap();
        assert_eq!(results.code.unwrap().len(), 3);
        assert_eq!(results.markdown.unwrap().len(), 2);
    }

    #[test]
    fn ties_keep_row_order() {
        let idx = SearchIndex::from_artifact(
            "ties",
            Artifact {
                records: vec![record("a.rs", 0), record("a.rs", 1), record("a.rs", 2)],
                vectors: array![[1.0_f32], [1.0], [1.0]],
                engine_id: None,
            },
        );
        let hits = idx.search_vector(&[1.0], 3, 0).unwrap().code.unwrap();
        let starts: Vec<_> = hits.iter().map(|h| h.record.start).collect();
        assert_eq!(starts, [0, 1, 2]);
    }

    #[test]
    fn wrong_query_width_is_rejected() {
        let err = index().search_vector(&[1.0, 0.0, 0.0], 1, 0).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn absent_partition_is_none() {
        let idx = SearchIndex::from_artifact(
            "code-only",
            Artifact {
                records: vec![record("main.go", 0)],
                vectors: array![[1.0_f32, 0.0]],
                engine_id: None,
            },
        );
        let results = idx.search_vector(&[1.0, 0.0], 1, 3).unwrap();
        assert_eq!(results.code.unwrap().len(), 1);
        assert!(results.markdown.is_none());
    }

    #[tokio::test]
    async fn zero_counts_skip_embedding() {
        let mock = MockEmbedder::with_dimension(2);
        let e = embedder(mock.clone(), "mock");
        let results = index().search(&e, "anything", 0, 0).await.unwrap();

        assert_eq!(mock.calls(), 0);
        assert!(results.code.unwrap().is_empty());
        assert!(results.markdown.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_embeds_query_once() {
        let mock = MockEmbedder::with_dimension(2).with_vector("where is a", vec![1.0, 0.0]);
        let e = embedder(mock.clone(), "mock");
        let results = index().search(&e, "where is a", 1, 1).await.unwrap();

        assert_eq!(mock.calls(), 1);
        assert_eq!(results.code.unwrap()[0].record.file_path, "src/a.rs");
    }

    #[tokio::test]
    async fn engine_mismatch_is_rejected() {
        let mock = MockEmbedder::with_dimension(2);
        let e = embedder(mock.clone(), "other-engine");
        let err = index().search(&e, "q", 1, 1).await.unwrap_err();

        assert!(matches!(err, IndexError::EngineMismatch { .. }));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn hit_serializes_flat() {
        let hit = SearchHit {
            record: record("a.rs", 3),
            score: 0.5,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["filePath"], "a.rs");
        assert_eq!(json["start"], 3);
        assert_eq!(json["score"], 0.5);
    }
}
