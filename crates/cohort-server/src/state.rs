//! Shared handler state.

use std::sync::Arc;

use cohort_config::GatewayConfig;
use cohort_federation::{Dispatcher, PeerRegistry};
use cohort_query::{Limits, QueryError, SearchEngine};
use cohort_store::Repository;
use tracing::info;

use crate::auth::{AuthService, Caller};
use crate::error::ServerResult;

/// Everything a handler needs, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    repo: Arc<Repository>,
    limits: Limits,
    dispatcher: Dispatcher,
    auth: Arc<AuthService>,
    dp_epsilon: Option<f64>,
    federate_components: bool,
}

impl AppState {
    pub fn new(repo: Repository, dispatcher: Dispatcher, auth: AuthService) -> Self {
        Self {
            repo: Arc::new(repo),
            limits: Limits::default(),
            dispatcher,
            auth: Arc::new(auth),
            dp_epsilon: None,
            federate_components: false,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_dp_epsilon(mut self, epsilon: Option<f64>) -> Self {
        self.dp_epsilon = epsilon;
        self
    }

    pub fn with_federated_components(mut self, enabled: bool) -> Self {
        self.federate_components = enabled;
        self
    }

    /// Loads the repository, peers and access list named by `config`.
    pub fn from_config(config: &GatewayConfig) -> ServerResult<Self> {
        let repo = Repository::open(&config.repository.snapshot)?;
        info!(
            snapshot = %config.repository.snapshot.display(),
            datasets = repo.datasets().count(),
            records = repo.clinical_record_count(),
            "Repository loaded"
        );

        let mut registry = PeerRegistry::new(&config.federation.initial_peers)?;
        if let Some(path) = &config.federation.peers_file {
            registry.load_file(path)?;
        }
        info!(peers = registry.len(), "Peer registry ready");

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            config.federation.peer_timeout(),
            config.federation.max_concurrent_peers,
        )?;
        let auth = AuthService::from_config(&config.auth)?;
        info!(mode = ?config.auth.mode, "Authentication configured");

        Ok(Self::new(repo, dispatcher, auth)
            .with_limits(Limits {
                default_page_size: config.search.default_page_size,
                max_response_length: config.search.max_response_length,
            })
            .with_dp_epsilon(config.privacy.dp_epsilon)
            .with_federated_components(config.federation.federate_components))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn engine(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.repo, self.limits)
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dp_epsilon(&self) -> Option<f64> {
        self.dp_epsilon
    }

    pub fn federate_components(&self) -> bool {
        self.federate_components
    }

    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Caller, QueryError> {
        self.auth.authenticate(authorization, &self.repo)
    }
}
