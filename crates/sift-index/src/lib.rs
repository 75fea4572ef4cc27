//! Semantic codebase index: line-window chunking, embedding artifacts on disk,
//! exact vector search split by content class, and the context-need classifier.

pub mod artifact;
pub mod builder;
pub mod chunker;
pub mod classifier;
pub mod error;
pub mod languages;
pub mod search;

pub use artifact::{ArtifactStore, ChunkRecord};
pub use builder::{BuildReport, BuilderConfig, IndexBuilder};
pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use classifier::{ContextClassifier, ContextDecision, ReferenceCorpus};
pub use error::{IndexError, Result};
pub use languages::ContentClass;
pub use search::{SearchHit, SearchIndex, SearchResults};
