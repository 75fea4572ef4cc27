//! On-disk artifact pair: chunk metadata (JSON) and the embedding matrix (`.npy`).
//!
//! Each build writes a new *generation* of both files and then publishes it by
//! atomically replacing a small manifest that names the pair. Readers resolve files
//! only through the manifest, so they see either the previous pair or the new one.
//! The generation before the current one is kept on disk, so a reader that resolved
//! the old manifest just before a swap can still open its files.
//!
//! Builds never write the unversioned `<id>_embeddings_metadata.json` /
//! `<id>_embeddings.npy` names. They are only read, as a fallback for directories
//! written by older tools without a manifest.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{IndexError, Result};

/// One persisted chunk; row `i` of the matrix is the embedding of record `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Pointer to the currently published generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: String,
    pub engine_id: String,
    pub dimension: usize,
    pub rows: usize,
    pub metadata: String,
    pub vectors: String,
}

/// A loaded, validated artifact pair.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub records: Vec<ChunkRecord>,
    pub vectors: Array2<f32>,
    /// `None` for legacy directories that carry no manifest.
    pub engine_id: Option<String>,
}

/// Replace every character that is not ASCII alphanumeric with `_`.
#[must_use]
pub fn safe_id(codebase_id: &str) -> String {
    codebase_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Artifact files of one codebase inside an embeddings directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    codebase_id: String,
    safe_id: String,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, codebase_id: &str) -> Self {
        Self {
            dir: dir.into(),
            codebase_id: codebase_id.to_owned(),
            safe_id: safe_id(codebase_id),
        }
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_embeddings.manifest.json", self.safe_id))
    }

    #[must_use]
    pub fn legacy_metadata_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_embeddings_metadata.json", self.safe_id))
    }

    #[must_use]
    pub fn legacy_vectors_path(&self) -> PathBuf {
        self.dir.join(format!("{}_embeddings.npy", self.safe_id))
    }

    fn metadata_name(&self, generation: &str) -> String {
        format!("{}_embeddings_metadata.{generation}.json", self.safe_id)
    }

    fn vectors_name(&self, generation: &str) -> String {
        format!("{}_embeddings.{generation}.npy", self.safe_id)
    }

    /// Write a new generation and publish it.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair violates the lock-step invariant or any file
    /// operation fails. On error the previously published generation stays current.
    pub fn write(
        &self,
        records: &[ChunkRecord],
        vectors: &Array2<f32>,
        engine_id: &str,
    ) -> Result<Manifest> {
        validate(records, vectors)?;
        std::fs::create_dir_all(&self.dir)?;
        let started = SystemTime::now();
        let previous = self.current_generation();

        let generation = uuid::Uuid::new_v4().simple().to_string();
        let manifest = Manifest {
            metadata: self.metadata_name(&generation),
            vectors: self.vectors_name(&generation),
            generation,
            engine_id: engine_id.to_owned(),
            dimension: vectors.ncols(),
            rows: vectors.nrows(),
        };

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer(&mut writer, records)?;
            writer.flush()?;
        }
        publish(staged, &self.dir.join(&manifest.metadata))?;

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            vectors.write_npy(&mut writer)?;
            writer.flush()?;
        }
        publish(staged, &self.dir.join(&manifest.vectors))?;

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(staged.as_file_mut(), &manifest)?;
        publish(staged, &self.manifest_path())?;

        tracing::info!(
            codebase = %self.codebase_id,
            generation = %manifest.generation,
            rows = manifest.rows,
            dimension = manifest.dimension,
            "published index artifacts"
        );

        let mut keep = vec![manifest.generation.as_str()];
        keep.extend(previous.as_deref());
        self.prune_stale_generations(&keep, started);
        Ok(manifest)
    }

    /// Load the currently published pair.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Unavailable` if no artifacts exist or they are unreadable,
    /// malformed, or out of lock-step.
    pub fn read(&self) -> Result<Artifact> {
        self.read_inner().map_err(|e| match e {
            IndexError::Unavailable { .. } => e,
            other => IndexError::Unavailable {
                codebase_id: self.codebase_id.clone(),
                reason: other.to_string(),
            },
        })
    }

    fn read_inner(&self) -> Result<Artifact> {
        let manifest_path = self.manifest_path();
        let (metadata_path, vectors_path, manifest) = if manifest_path.exists() {
            let manifest: Manifest =
                serde_json::from_reader(BufReader::new(File::open(&manifest_path)?))?;
            (
                self.dir.join(&manifest.metadata),
                self.dir.join(&manifest.vectors),
                Some(manifest),
            )
        } else if self.legacy_metadata_path().exists() {
            (self.legacy_metadata_path(), self.legacy_vectors_path(), None)
        } else {
            return Err(IndexError::Unavailable {
                codebase_id: self.codebase_id.clone(),
                reason: format!("no index artifacts in {}", self.dir.display()),
            });
        };

        let records: Vec<ChunkRecord> =
            serde_json::from_reader(BufReader::new(File::open(&metadata_path)?))?;
        let vectors = Array2::<f32>::read_npy(BufReader::new(File::open(&vectors_path)?))?;
        validate(&records, &vectors)?;

        if let Some(m) = &manifest
            && (m.rows != vectors.nrows() || m.dimension != vectors.ncols())
        {
            return Err(IndexError::InvalidArtifact(format!(
                "manifest declares {}x{}, matrix is {}x{}",
                m.rows,
                m.dimension,
                vectors.nrows(),
                vectors.ncols()
            )));
        }

        Ok(Artifact {
            records,
            vectors,
            engine_id: manifest.map(|m| m.engine_id),
        })
    }

    /// Generation named by the published manifest, if any.
    fn current_generation(&self) -> Option<String> {
        let file = File::open(self.manifest_path()).ok()?;
        serde_json::from_reader::<_, Manifest>(BufReader::new(file))
            .ok()
            .map(|m| m.generation)
    }

    /// Remove generation files not in `keep`.
    ///
    /// Files modified after `started` belong to a build running alongside this one and
    /// are left alone. Failures only cost disk space.
    fn prune_stale_generations(&self, keep: &[&str], started: SystemTime) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(generation) = self.generation_of(name) else {
                continue;
            };
            if keep.contains(&generation) {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified());
            if modified.is_ok_and(|t| t > started) {
                continue;
            }
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(file = name, "failed to remove stale artifact: {e}");
            } else {
                tracing::debug!(file = name, "removed stale artifact");
            }
        }
    }

    /// Generation suffix if `name` is one of this codebase's generation files.
    fn generation_of<'a>(&self, name: &'a str) -> Option<&'a str> {
        let metadata_prefix = format!("{}_embeddings_metadata.", self.safe_id);
        let vectors_prefix = format!("{}_embeddings.", self.safe_id);
        let generation = name
            .strip_prefix(&metadata_prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .or_else(|| {
                name.strip_prefix(&vectors_prefix)
                    .and_then(|rest| rest.strip_suffix(".npy"))
            })?;
        (!generation.is_empty() && generation.chars().all(|c| c.is_ascii_alphanumeric()))
            .then_some(generation)
    }
}

fn publish(staged: NamedTempFile, target: &Path) -> Result<()> {
    staged.as_file().sync_all()?;
    staged.persist(target)?;
    Ok(())
}

fn validate(records: &[ChunkRecord], vectors: &Array2<f32>) -> Result<()> {
    if records.len() != vectors.nrows() {
        return Err(IndexError::InvalidArtifact(format!(
            "{} metadata records but {} vector rows",
            records.len(),
            vectors.nrows()
        )));
    }
    if !records.is_empty() && vectors.ncols() == 0 {
        return Err(IndexError::InvalidArtifact("zero-width vectors".into()));
    }
    if let Some(bad) = records.iter().find(|r| r.end <= r.start) {
        return Err(IndexError::InvalidArtifact(format!(
            "empty line range {}..{} in {}",
            bad.start, bad.end, bad.file_path
        )));
    }
    Ok(())
}
