//! Error types for sift-index.

/// Errors that can occur while building, loading, or querying an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading sources or writing artifacts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding provider error.
    #[error("embedding error: {0}")]
    Llm(#[from] sift_llm::LlmError),

    /// Metadata (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vector matrix could not be written.
    #[error("npy write failed: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// Vector matrix could not be read.
    #[error("npy read failed: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// Flat vector buffer does not fit the declared matrix shape.
    #[error("matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Atomic rename of a staged artifact failed.
    #[error("artifact publish failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The persisted index for a codebase is missing or corrupt.
    #[error("index unavailable for codebase '{codebase_id}': {reason}")]
    Unavailable { codebase_id: String, reason: String },

    /// Vectors of different widths were mixed.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Query engine differs from the engine the index was built with.
    #[error("index built with engine '{index}', query embedded with '{query}'")]
    EngineMismatch { index: String, query: String },

    /// A blocking chunking or publishing task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Artifact contents violate an invariant.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
