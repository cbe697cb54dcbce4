//! Repository error types.

use std::path::PathBuf;

use cohort_types::IdError;
use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while loading or querying the repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No dataset with this name or id.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// No entity of this kind with this id or name.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An id that does not decode.
    #[error("malformed id: {0}")]
    InvalidId(#[from] IdError),

    /// Two entities share a name within one dataset and table.
    #[error("duplicate {kind} '{name}' in dataset '{dataset}'")]
    Duplicate {
        kind: &'static str,
        dataset: String,
        name: String,
    },

    /// A record references a reference set that was never declared.
    #[error("unknown reference set '{0}'")]
    UnknownReferenceSet(String),

    /// A tier companion field holds a value outside 0..=4.
    #[error("field '{field}' has invalid tier {value}")]
    InvalidTier { field: String, value: String },

    /// Snapshot file could not be read.
    #[error("failed to read snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Snapshot file is not valid JSON for the expected shape.
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true for lookups that simply found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DatasetNotFound(_) | Self::NotFound { .. })
    }
}
