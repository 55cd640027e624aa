use super::CodeSigningError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature algorithm a manifest may be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodeSigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256 (`rsa-v1_5-sha256`).
    #[default]
    #[serde(rename = "rsa-v1_5-sha256")]
    RsaSha256,
}

impl CodeSigningAlgorithm {
    /// Wire name used in the `alg` header member and configuration metadata.
    pub fn name(self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-v1_5-sha256",
        }
    }

    /// Parse an optional algorithm name, defaulting to RSA-SHA256 when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::InvalidAlgorithm`] for unrecognized names.
    pub fn parse_or_default(name: Option<&str>) -> Result<Self, CodeSigningError> {
        name.map_or(Ok(Self::default()), str::parse)
    }
}

impl FromStr for CodeSigningAlgorithm {
    type Err = CodeSigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-v1_5-sha256" => Ok(Self::RsaSha256),
            other => Err(CodeSigningError::InvalidAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for CodeSigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
