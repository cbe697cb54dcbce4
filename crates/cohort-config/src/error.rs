//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to merge configuration: {0}")]
    MergeError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("XDG directory error: {0}")]
    XdgError(String),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}
