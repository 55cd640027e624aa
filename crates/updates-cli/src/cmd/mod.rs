//! Subcommand implementations.

pub mod accept_header;
pub mod select;
pub mod verify;

use anyhow::{Context, Result};
use updates_core::{CodeSigningConfiguration, UpdatesConfiguration};

/// The configured code signing settings, or an error naming the missing section.
fn code_signing(config: &UpdatesConfiguration) -> Result<CodeSigningConfiguration> {
    config
        .code_signing_configuration()?
        .context("Code signing is not configured (missing [code_signing] section)")
}
