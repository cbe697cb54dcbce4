//! CLI command implementations.

pub mod check;
pub mod start;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use cohort_config::{ConfigLoader, GatewayConfig};

/// Loads the layered configuration for `project_dir`.
pub fn load_config(project_dir: &Path, extra: Option<&Path>) -> Result<GatewayConfig> {
    let mut loader = ConfigLoader::new().with_project_dir(project_dir);
    if let Some(file) = extra {
        loader = loader.with_file(file);
    }
    loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", project_dir.display()))
}
