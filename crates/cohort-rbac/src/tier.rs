//! Access-tier resolution.

use std::path::PathBuf;

use cohort_store::Dataset;
use cohort_types::{AccessMap, Tier};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while resolving access.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The caller's access map does not name the dataset.
    #[error("not authorized to access dataset '{0}'")]
    NotAuthorized(String),

    /// The access list file could not be read.
    #[error("failed to read access list at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The access list header is not `issuer<TAB>username<TAB>...`.
    #[error("malformed access list header: {0}")]
    MalformedHeader(String),
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Returns the caller's tier for `dataset`.
///
/// Fails with [`AccessError::NotAuthorized`] when the dataset's local name is
/// not a key of `access`.
pub fn resolve_tier(dataset: &Dataset, access: &AccessMap) -> Result<Tier> {
    match access.tier(&dataset.name) {
        Some(tier) => {
            debug!(dataset = %dataset.name, tier = %tier, "Access tier resolved");
            Ok(tier)
        }
        None => {
            warn!(dataset = %dataset.name, "Access denied: dataset not in access map");
            Err(AccessError::NotAuthorized(dataset.name.clone()))
        }
    }
}
