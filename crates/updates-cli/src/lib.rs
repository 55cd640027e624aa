//! updates - operator tooling for the updates client
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Loads an `updates.toml` configuration and runs the trust and selection
//! core against files on disk: verify a signed manifest body, print the
//! accept-signature header, or preview which update would launch and which
//! would be reaped.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "updates")]
#[command(author, version, about = "updates - code signing and update selection")]
pub struct Cli {
    /// Path to the client configuration
    #[arg(long, global = true, env = "UPDATES_CONFIG", default_value = "updates.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify a manifest or directive body against its signature
    Verify {
        /// File holding the exact response body
        #[arg(long)]
        body: PathBuf,
        /// Value of the expo-signature header
        #[arg(long)]
        signature: Option<String>,
        /// PEM file with the certificate chain sent alongside the body
        #[arg(long)]
        chain: Option<PathBuf>,
    },
    /// Print the accept-signature header the client sends
    #[command(name = "accept-header")]
    AcceptHeader,
    /// Show which update would launch and which would be deleted
    Select {
        /// JSON file with an array of update records
        #[arg(long)]
        updates: PathBuf,
        /// Id of the running update (defaults to the one selected for launch)
        #[arg(long)]
        launched: Option<Uuid>,
        /// Value of the expo-manifest-filters header
        #[arg(long)]
        filters: Option<String>,
    },
}
