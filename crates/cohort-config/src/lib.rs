//! Layered configuration for the cohort gateway
//!
//! Configuration is merged from, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (`~/.config/cohort/config.toml`)
//! 3. Project config (`cohort.toml`)
//! 4. Local overrides (`cohort.local.toml`, gitignored)
//! 5. Environment variables (`COHORT_SECTION__KEY`)
//!
//! ```no_run
//! use cohort_config::ConfigLoader;
//!
//! let config = ConfigLoader::new().with_project_dir("/srv/node-a").load()?;
//! println!("listening on {}", config.server.bind_address);
//! # Ok::<(), cohort_config::ConfigError>(())
//! ```

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete gateway node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub search: SearchConfig,
    pub privacy: PrivacyConfig,
    pub federation: FederationConfig,
    pub auth: AuthConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Where the repository snapshot lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub snapshot: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("data/repository.json"),
        }
    }
}

/// Paging limits applied to every search response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_page_size: usize,
    /// Soft byte ceiling for one response page
    pub max_response_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 1800,
            max_response_length: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Laplace noise on count cells; absent disables it
    pub dp_epsilon: Option<f64>,
}

/// Peer fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FederationConfig {
    pub initial_peers: Vec<String>,
    /// Optional file with one peer URL per line
    pub peers_file: Option<PathBuf>,
    pub max_concurrent_peers: usize,
    pub peer_timeout_ms: u64,
    /// Route compound-query components through the dispatcher.
    ///
    /// Merged component pages carry the first page token any node returned,
    /// so paging through them stays consistent only while every node shares
    /// `search.default_page_size` and `search.max_response_length`.
    pub federate_components: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            initial_peers: Vec::new(),
            peers_file: None,
            max_concurrent_peers: 10,
            peer_timeout_ms: 10_000,
            federate_components: false,
        }
    }
}

impl FederationConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

/// How callers are identified
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Development mode: every caller has full access
    #[default]
    None,
    /// Bearer token already verified upstream; claims are only decoded
    Gateway,
    /// Bearer token verified locally with a shared HS256 secret
    Jwt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub access_list: Option<PathBuf>,
    pub jwt_secret: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from the current directory
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific directory
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(dir).load()
    }

    /// Resolve relative paths against the project directory
    pub fn resolve_paths(&mut self, project_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = project_dir.join(&*path);
            }
        };
        resolve(&mut self.repository.snapshot);
        if let Some(path) = self.federation.peers_file.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.auth.access_list.as_mut() {
            resolve(path);
        }
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.search.default_page_size == 0 {
            return invalid("search.default_page_size must be positive");
        }
        if self.search.max_response_length == 0 {
            return invalid("search.max_response_length must be positive");
        }
        if let Some(epsilon) = self.privacy.dp_epsilon {
            if !epsilon.is_finite() || epsilon <= 0.0 {
                return invalid("privacy.dp_epsilon must be a positive finite number");
            }
        }
        if self.federation.max_concurrent_peers == 0 {
            return invalid("federation.max_concurrent_peers must be positive");
        }
        if self.federation.peer_timeout_ms == 0 {
            return invalid("federation.peer_timeout_ms must be positive");
        }
        match self.auth.mode {
            AuthMode::None => {}
            AuthMode::Gateway | AuthMode::Jwt if self.auth.access_list.is_none() => {
                return invalid("auth.access_list is required unless auth.mode = \"none\"");
            }
            AuthMode::Jwt if self.auth.jwt_secret.as_deref().is_none_or(str::is_empty) => {
                return invalid("auth.jwt_secret is required when auth.mode = \"jwt\"");
            }
            AuthMode::Gateway | AuthMode::Jwt => {}
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
