//! Index orchestrator: walk → chunk → embed → persist.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryStreamExt};
use ndarray::Array2;
use sift_llm::{EmbeddingClient, EmbeddingProvider};
use tokio_stream::wrappers::ReceiverStream;

use crate::artifact::{ArtifactStore, ChunkRecord, Manifest};
use crate::chunker::{Chunk, Chunker, ChunkerConfig};
use crate::error::{IndexError, Result};
use crate::languages::ContentClass;

/// Chunks sent per embedding request.
pub const EMBED_BATCH_SIZE: usize = 512;

/// Builder configuration.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Chunks per embedding request (default: [`EMBED_BATCH_SIZE`]).
    pub batch_size: usize,
    /// Embedding requests in flight at once (default: 4).
    pub concurrency: usize,
    pub chunker: ChunkerConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: EMBED_BATCH_SIZE,
            concurrency: 4,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Summary of a build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub files_indexed: usize,
    pub code_chunks: usize,
    pub markdown_chunks: usize,
    pub batches: usize,
    pub dimension: usize,
    pub duration_ms: u64,
    pub manifest: Manifest,
}

impl BuildReport {
    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.code_chunks + self.markdown_chunks
    }
}

/// Builds and publishes the artifact pair for one codebase.
pub struct IndexBuilder<P> {
    client: Arc<EmbeddingClient<P>>,
    engine_id: String,
    config: BuilderConfig,
}

impl<P: EmbeddingProvider> IndexBuilder<P> {
    #[must_use]
    pub fn new(
        client: Arc<EmbeddingClient<P>>,
        engine_id: impl Into<String>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            client,
            engine_id: engine_id.into(),
            config,
        }
    }

    #[must_use]
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Chunk `codebase_path`, embed every chunk, and publish the result to `output_dir`.
    ///
    /// Batches are embedded concurrently but reassembled in chunk order, so row `i`
    /// of the matrix always belongs to metadata record `i`. Any embedding failure
    /// aborts the build before anything is written.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error, a `DimensionMismatch` if batches disagree on
    /// vector width, or an IO error while publishing.
    pub async fn build(
        &self,
        codebase_id: &str,
        codebase_path: &Path,
        output_dir: &Path,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(codebase = codebase_id, root = %codebase_path.display(), "indexing started");

        // Walking and reading sources blocks, so chunks are produced on the blocking
        // pool and handed over with backpressure while batches are in flight.
        let (tx, rx) = tokio::sync::mpsc::channel(batch_size * concurrency);
        let chunker = Chunker::new(codebase_path, self.config.chunker.clone());
        let producer = tokio::task::spawn_blocking(move || {
            for chunk in chunker.chunks() {
                if tx.blocking_send(chunk).is_err() {
                    break;
                }
            }
        });

        let client = self.client.as_ref();
        let engine_id = self.engine_id.as_str();
        let batches: Vec<(Vec<Chunk>, Vec<Vec<f32>>)> = ReceiverStream::new(rx)
            .chunks(batch_size)
            .enumerate()
            .map(|(n, batch)| async move {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = client.embed(&texts, engine_id).await?;
                tracing::debug!(batch = n, size = texts.len(), "batch embedded");
                Ok::<_, IndexError>((batch, vectors))
            })
            .buffered(concurrency)
            .try_collect()
            .await?;
        producer.await?;

        let batch_count = batches.len();
        let mut records = Vec::new();
        let mut flat = Vec::new();
        let mut dimension = None;
        for (chunks, vectors) in batches {
            if chunks.len() != vectors.len() {
                return Err(IndexError::InvalidArtifact(format!(
                    "{} chunks but {} embeddings in batch",
                    chunks.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in chunks.into_iter().zip(vectors) {
                let expected = *dimension.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
                flat.extend_from_slice(&vector);
                records.push(ChunkRecord {
                    file_path: chunk.file_path,
                    start: chunk.start_line,
                    end: chunk.end_line,
                    text: chunk.text,
                });
            }
        }

        let dimension = dimension.unwrap_or(0);
        let matrix = Array2::from_shape_vec((records.len(), dimension), flat)?;
        let store = ArtifactStore::new(output_dir, codebase_id);
        let engine_id = self.engine_id.clone();
        let (records, manifest) = tokio::task::spawn_blocking(move || {
            let manifest = store.write(&records, &matrix, &engine_id)?;
            Ok::<_, IndexError>((records, manifest))
        })
        .await??;

        let markdown_chunks = records
            .iter()
            .filter(|r| ContentClass::of(&r.file_path) == ContentClass::Markdown)
            .count();
        let files_indexed = records
            .chunk_by(|a, b| a.file_path == b.file_path)
            .count();

        let report = BuildReport {
            files_indexed,
            code_chunks: records.len() - markdown_chunks,
            markdown_chunks,
            batches: batch_count,
            dimension,
            duration_ms: start.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
            manifest,
        };
        tracing::info!(
            codebase = codebase_id,
            files = report.files_indexed,
            chunks = report.total_chunks(),
            dimension,
            duration_ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use sift_llm::RetryPolicy;
    use sift_llm::mock::MockEmbedder;

    use super::*;

    fn write(dir: &Path, rel: &str, lines: usize) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body: String = (0..lines)
            .map(|i| format!("line {i} of {rel} with some filler text\n"))
            .collect();
        std::fs::write(path, body).unwrap();
    }

    fn builder(provider: MockEmbedder, batch_size: usize) -> IndexBuilder<MockEmbedder> {
        IndexBuilder::new(
            Arc::new(EmbeddingClient::new(provider).with_retry(RetryPolicy::new(
                1,
                std::time::Duration::from_millis(1),
                std::time::Duration::from_millis(1),
            ))),
            "mock-engine",
            BuilderConfig {
                batch_size,
                ..BuilderConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn rows_line_up_with_records() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "src/a.rs", 120);
        write(src.path(), "src/b.py", 40);
        write(src.path(), "docs/guide.md", 30);

        let mock = MockEmbedder::with_dimension(16).with_reversed_response();
        let report = builder(mock.clone(), 3)
            .build("acme/app", src.path(), out.path())
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 3);
        assert!(report.markdown_chunks >= 1);
        assert!(report.batches > 1);
        assert_eq!(report.dimension, 16);

        let artifact = ArtifactStore::new(out.path(), "acme/app").read().unwrap();
        assert_eq!(artifact.records.len(), report.total_chunks());
        for (i, record) in artifact.records.iter().enumerate() {
            let expected = mock.vector_for(&record.text.replace('\n', " "));
            assert_eq!(artifact.vectors.row(i).to_vec(), expected, "row {i}");
        }
    }

    #[tokio::test]
    async fn records_follow_walk_order() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "b.rs", 10);
        write(src.path(), "a.rs", 10);

        builder(MockEmbedder::default(), 1)
            .build("x", src.path(), out.path())
            .await
            .unwrap();
        let artifact = ArtifactStore::new(out.path(), "x").read().unwrap();
        let files: Vec<_> = artifact.records.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(files, ["a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn empty_codebase_publishes_empty_index() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("tiny.rs"), "fn main() {}\n").unwrap();

        let mock = MockEmbedder::default();
        let report = builder(mock.clone(), 8)
            .build("empty", src.path(), out.path())
            .await
            .unwrap();

        assert_eq!(report.total_chunks(), 0);
        assert_eq!(mock.calls(), 0);
        let artifact = ArtifactStore::new(out.path(), "empty").read().unwrap();
        assert!(artifact.records.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "main.go", 50);

        let err = builder(MockEmbedder::failing(), 4)
            .build("broken", src.path(), out.path())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Llm(_)));
        assert!(!ArtifactStore::new(out.path(), "broken").manifest_path().exists());
    }

    #[tokio::test]
    async fn more_chunks_than_channel_capacity() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for i in 0..24 {
            write(src.path(), &format!("mod_{i:02}.rs"), 10);
        }

        let report = builder(MockEmbedder::default(), 1)
            .build("wide", src.path(), out.path())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 24);
        assert_eq!(report.batches, 24);
    }

    #[tokio::test]
    async fn failure_stops_chunk_producer() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for i in 0..24 {
            write(src.path(), &format!("mod_{i:02}.rs"), 10);
        }

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            builder(MockEmbedder::failing(), 1).build("wide", src.path(), out.path()),
        )
        .await
        .expect("build must not hang once embedding fails")
        .unwrap_err();
        assert!(matches!(err, IndexError::Llm(_)));
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(src.path(), "lib.rs", 20);

        builder(MockEmbedder::default(), 4)
            .build("repo", src.path(), out.path())
            .await
            .unwrap();
        write(src.path(), "extra.rs", 20);
        builder(MockEmbedder::failing(), 4)
            .build("repo", src.path(), out.path())
            .await
            .unwrap_err();

        let artifact = ArtifactStore::new(out.path(), "repo").read().unwrap();
        assert!(artifact.records.iter().all(|r| r.file_path == "lib.rs"));
    }
}
