//! Configuration loader with multi-source merging

use crate::{ConfigError, GatewayConfig, Paths};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    explicit_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "COHORT".to_string(),
            explicit_file: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "COHORT")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Layer one more file above the project files (e.g. `--config`)
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<GatewayConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = GatewayConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/cohort/config.toml)
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(toml_file(user_config_file, false));
            }
        }

        // 3. Project config (cohort.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file, false));
        }

        // 4. Local config (cohort.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file, false));
        }

        if let Some(file) = self.explicit_file {
            builder = builder.add_source(toml_file(file, true));
        }

        // 5. Environment variables (COHORT_SECTION__KEY)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("federation.initial_peers")
                .try_parsing(true),
        );

        let mut gateway_config: GatewayConfig = builder.build()?.try_deserialize()?;

        // Resolve relative paths
        gateway_config.resolve_paths(&self.project_dir);
        gateway_config.validate()?;

        Ok(gateway_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf, required: bool) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(required)
        .format(config::FileFormat::Toml)
}
