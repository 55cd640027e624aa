//! Verify command

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use updates_core::UpdatesConfiguration;
use updates_core::codesigning::ValidationStatus;

/// Validate `body_path` against `signature` and print the outcome.
///
/// When the certificate carries project information and the body is a JSON
/// manifest, its `extra.eas.projectId` and `extra.scopeKey` must match. A
/// manifest without a scope key is checked against the configured one.
pub fn verify(
    config: &UpdatesConfiguration,
    body_path: &Path,
    signature: Option<&str>,
    chain_path: Option<&Path>,
) -> Result<()> {
    let signing = super::code_signing(config)?;

    let body = std::fs::read(body_path)
        .with_context(|| format!("Failed to read body {}", body_path.display()))?;
    let chain = chain_path
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read chain {}", path.display()))
        })
        .transpose()?;

    let result = signing
        .validate_signature(signature, &body, chain.as_deref())
        .context("Signature validation failed")?;

    let status = match result.status {
        ValidationStatus::Valid => "valid",
        ValidationStatus::Invalid => "invalid",
        ValidationStatus::Skipped => "skipped",
    };
    println!("{status}");

    if let Some(info) = &result.project_information {
        println!("  {:<12}{}", "project id", info.project_id);
        println!("  {:<12}{}", "scope key", info.scope_key);

        if let Ok(manifest) = serde_json::from_slice::<Value>(&body) {
            config
                .check_manifest_scope(&result, &manifest)
                .context("Manifest does not belong to the certificate's project")?;
        }
    }

    Ok(())
}
