use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FederationError>;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("invalid peer url '{url}': {reason}")]
    InvalidPeerUrl { url: String, reason: String },

    #[error("failed to read peers file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
