//! Accept-header command

use anyhow::Result;
use updates_core::UpdatesConfiguration;

/// Print the `expo-expect-signature` value for the configured key.
pub fn accept_header(config: &UpdatesConfiguration) -> Result<()> {
    let signing = super::code_signing(config)?;
    println!("{}", signing.accept_signature_header());
    Ok(())
}
