//! updates - code signing and update selection CLI

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use updates_cli::cmd;
use updates_cli::{Cli, Commands};
use updates_core::UpdatesConfiguration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = UpdatesConfiguration::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::debug!(config = %cli.config.display(), "loaded configuration");

    match cli.command {
        Commands::Verify {
            body,
            signature,
            chain,
        } => cmd::verify::verify(&config, &body, signature.as_deref(), chain.as_deref()),
        Commands::AcceptHeader => cmd::accept_header::accept_header(&config),
        Commands::Select {
            updates,
            launched,
            filters,
        } => cmd::select::select(&config, &updates, launched, filters.as_deref()),
    }
}
