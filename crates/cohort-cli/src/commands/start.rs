//! Start command - runs a gateway node.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

pub fn run(project_dir: &Path, extra: Option<&Path>, address: Option<String>, peers: Vec<String>) -> Result<()> {
    let mut config = super::load_config(project_dir, extra)?;
    if let Some(address) = address {
        config.server.bind_address = address;
    }
    config.federation.initial_peers.extend(peers);
    config.validate().context("Invalid configuration")?;

    info!("Starting cohort gateway...");
    println!();
    println!("Cohort - federated clinical and genomic query gateway");
    println!();
    println!("  Snapshot:       {}", config.repository.snapshot.display());
    println!("  Bind address:   {}", config.server.bind_address);
    println!("  Auth mode:      {:?}", config.auth.mode);
    println!("  Initial peers:  {}", config.federation.initial_peers.len());
    if let Some(epsilon) = config.privacy.dp_epsilon {
        println!("  DP epsilon:     {epsilon}");
    }
    println!();
    println!("Press Ctrl+C to stop.");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(cohort_server::run(&config))
        .context("Gateway error during operation")?;

    println!();
    println!("Gateway stopped gracefully.");
    Ok(())
}
