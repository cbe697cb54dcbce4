//! # cohort-server: HTTP surface of a gateway node
//!
//! Wires the query engine, the federation dispatcher and caller
//! authentication into an axum [`Router`](axum::Router). Every search and
//! lookup answers with `{"status": {...}, "results": {...}}`; every failure
//! with `{"error": ..., "httpStatus": ...}`.

use std::future::Future;

use cohort_config::GatewayConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod auth;
mod error;
mod executor;
mod routes;
mod state;

pub use auth::{AuthService, Caller, Claims};
pub use error::{ApiError, ServerError, ServerResult};
pub use executor::{GatewayExecutor, component_path};
pub use routes::{federation_requested, router};
pub use state::AppState;

/// Serves `state` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, peers = state.dispatcher().registry().len(), "Gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!(%addr, "Gateway stopped");
    Ok(())
}

/// Loads everything `config` names, binds and serves until Ctrl-C.
pub async fn run(config: &GatewayConfig) -> ServerResult<()> {
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.server.bind_address.clone(),
            source,
        })?;
    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
