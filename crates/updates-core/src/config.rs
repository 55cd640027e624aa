//! Client configuration loaded from `updates.toml`.
//!
//! The file names the runtime version(s) this binary supports, the trust
//! anchor used for code signing and which selection policy family to use.

use crate::codesigning::{CodeSigningConfiguration, CodeSigningError, SignatureValidationResult};
use crate::selection::{DevelopmentClientConfig, SelectionPolicy};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which selection policy family to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicyKind {
    /// Filter-aware launcher, loader and reaper.
    #[default]
    FilterAware,
    /// Override-aware launcher, loader and reaper.
    OverrideAware,
    /// Development-client launcher, loader and reaper.
    DevelopmentClient,
}

/// The `[code_signing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSigningSection {
    /// Inline PEM, or a path relative to the configuration file.
    pub certificate: String,
    /// `keyid` / `alg` overrides.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Validate a response-supplied chain against the certificate.
    #[serde(default)]
    pub include_manifest_response_certificate_chain: bool,
    /// Tolerate manifests without a signature.
    #[serde(default)]
    pub allow_unsigned_manifests: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfiguration {
    /// Single supported runtime version.
    #[serde(default)]
    pub runtime_version: Option<String>,
    /// Supported runtime versions, merged with `runtime_version`.
    #[serde(default)]
    pub runtime_versions: Vec<String>,
    /// Publisher/app namespace. Stands in for a manifest's missing `extra.scopeKey`.
    pub scope_key: String,
    /// Manifest URL.
    #[serde(default)]
    pub update_url: Option<String>,
    /// Extra manifest request headers.
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    /// Whether a development-client override is active.
    #[serde(default)]
    pub has_updates_override: bool,
    /// Selection policy family.
    #[serde(default)]
    pub selection_policy: SelectionPolicyKind,
    /// Development-client reaper limit.
    #[serde(default = "default_max_updates_to_keep")]
    pub max_updates_to_keep: usize,
    /// Code signing settings. Absent means manifests are not verified.
    #[serde(default)]
    pub code_signing: Option<CodeSigningSection>,

    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_max_updates_to_keep() -> usize {
    crate::selection::DEFAULT_MAX_UPDATES_TO_KEEP.get()
}

impl UpdatesConfiguration {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir)
            .with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Parse and validate configuration text. Relative certificate paths are
    /// resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content).context("Failed to parse configuration")?;
        config.base_dir = base_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.runtime_versions().is_empty() {
            bail!("at least one of runtime_version or runtime_versions must be set");
        }
        if self.max_updates_to_keep == 0 {
            bail!("max_updates_to_keep must be greater than zero");
        }
        Ok(())
    }

    /// The supported runtime versions, `runtime_version` first, without duplicates.
    pub fn runtime_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.runtime_version.iter().cloned().collect();
        for version in &self.runtime_versions {
            if !versions.contains(version) {
                versions.push(version.clone());
            }
        }
        versions
    }

    /// Override settings for the development-client policies.
    pub fn development_client_config(&self) -> DevelopmentClientConfig {
        DevelopmentClientConfig {
            has_updates_override: self.has_updates_override,
            update_url: self.update_url.clone(),
            request_headers: self.request_headers.clone(),
        }
    }

    /// Build the code signing configuration, reading the certificate file if
    /// `certificate` is a path. `None` when code signing is not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate file cannot be read or the
    /// certificate/metadata are invalid.
    pub fn code_signing_configuration(&self) -> Result<Option<CodeSigningConfiguration>> {
        let Some(section) = &self.code_signing else {
            return Ok(None);
        };

        let pem = if section.certificate.contains("-----BEGIN") {
            section.certificate.clone()
        } else {
            let path = self.base_dir.join(&section.certificate);
            debug!(path = %path.display(), "reading code signing certificate");
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read certificate {}", path.display()))?
        };

        let configuration = CodeSigningConfiguration::new(
            &pem,
            Some(&section.metadata),
            section.include_manifest_response_certificate_chain,
            section.allow_unsigned_manifests,
        )
        .context("Invalid code signing configuration")?;
        Ok(Some(configuration))
    }

    /// Check a verified JSON manifest against the certificate's project scope.
    ///
    /// The manifest claims `extra.eas.projectId` and `extra.scopeKey`; a
    /// manifest without a scope key is taken to belong to the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::ProjectScopeMismatch`] when the claimed
    /// scope differs from the certificate's.
    pub fn check_manifest_scope(
        &self,
        result: &SignatureValidationResult,
        manifest: &Value,
    ) -> Result<(), CodeSigningError> {
        let extra = &manifest["extra"];
        let scope_key = extra["scopeKey"]
            .as_str()
            .unwrap_or(self.scope_key.as_str());
        result.check_project_scope(extra["eas"]["projectId"].as_str(), Some(scope_key))
    }

    /// Build the configured selection policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy parameters are invalid.
    pub fn selection_policy(&self) -> Result<SelectionPolicy> {
        let runtime_versions = self.runtime_versions();
        let policy = match self.selection_policy {
            SelectionPolicyKind::FilterAware => SelectionPolicy::filter_aware(runtime_versions)?,
            SelectionPolicyKind::OverrideAware => {
                SelectionPolicy::override_aware(runtime_versions)?
            }
            SelectionPolicyKind::DevelopmentClient => {
                let runtime_version = runtime_versions
                    .into_iter()
                    .next()
                    .context("development client requires a runtime version")?;
                SelectionPolicy::development_client(
                    runtime_version,
                    Some(self.development_client_config()),
                    self.max_updates_to_keep,
                )?
            }
        };
        Ok(policy)
    }
}
