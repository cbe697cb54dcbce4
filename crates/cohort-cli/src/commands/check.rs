//! Check command - validates a node's configuration and inputs.

use std::path::Path;

use anyhow::{Context, Result};
use cohort_server::AppState;

pub fn run(project_dir: &Path, extra: Option<&Path>, print: bool) -> Result<()> {
    let config = super::load_config(project_dir, extra)?;
    if print {
        print!("{}", config.to_toml_string()?);
        println!();
    }

    // Building the state opens every file the node would serve from.
    let state = AppState::from_config(&config).context("Failed to prepare gateway state")?;

    println!("Configuration OK");
    println!("  Datasets:  {}", state.repository().datasets().count());
    println!("  Records:   {}", state.repository().clinical_record_count());
    println!("  Peers:     {}", state.dispatcher().registry().len());
    Ok(())
}
