use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Index(#[from] sift_index::IndexError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ServiceError {
    /// Whether the codebase has no usable index, as opposed to a failed request.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Index(sift_index::IndexError::Unavailable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
