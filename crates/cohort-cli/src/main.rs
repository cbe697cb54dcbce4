//! Cohort gateway CLI.
//!
//! ```bash
//! # Validate cohort.toml and everything it points at
//! cohort check --project-dir /srv/node-a
//!
//! # Serve, with one extra peer
//! cohort start --project-dir /srv/node-a --peer http://node-b:3000
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Cohort - federated clinical and genomic query gateway.
#[derive(Parser)]
#[command(name = "cohort")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where configuration comes from.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Directory holding cohort.toml and cohort.local.toml.
    #[arg(short, long, default_value = ".")]
    project_dir: PathBuf,

    /// Extra configuration file layered above the project files.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Start a gateway node.
    Start {
        #[command(flatten)]
        config: ConfigArgs,

        /// Address to bind to, overriding server.bind_address.
        #[arg(short, long)]
        address: Option<String>,

        /// Additional peer base URL (repeatable).
        #[arg(long = "peer")]
        peers: Vec<String>,
    },

    /// Load configuration, repository, access list and peers, then exit.
    Check {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the effective configuration as TOML.
        #[arg(long)]
        print: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Start { config, address, peers } => {
            commands::start::run(&config.project_dir, config.config.as_deref(), address, peers)
        }
        Commands::Check { config, print } => {
            commands::check::run(&config.project_dir, config.config.as_deref(), print)
        }
    }
}
