//! Update directives.
//!
//! Instead of a manifest, a server may answer an update check with a
//! directive: either "nothing new" or "roll back to the update embedded in
//! the binary". Directives are signed exactly like manifests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding a directive body.
#[derive(Error, Debug)]
pub enum DirectiveError {
    /// The body is not valid JSON or does not have the directive shape.
    #[error("Invalid directive JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field names a directive this client does not understand.
    #[error("Invalid update directive type: {0}")]
    UnknownType(String),

    /// A directive type is missing one of its required parameters.
    #[error("Update directive {kind} is missing parameter {parameter}")]
    MissingParameter {
        /// Directive `type` value.
        kind: &'static str,
        /// Name of the missing parameter.
        parameter: &'static str,
    },
}

/// Project identity the server claims to have signed a directive for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningInfo {
    /// EAS project identifier.
    #[serde(rename = "projectId")]
    pub eas_project_id: String,
    /// Publisher/app namespace.
    pub scope_key: String,
}

/// Parameters of a roll-back-to-embedded directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollBackToEmbeddedDirective {
    /// Commit time of the roll back. Compared against the launched update.
    pub commit_time: DateTime<Utc>,
    /// Signing scope carried in the directive's `extra` object.
    pub signing_info: Option<SigningInfo>,
}

/// A decoded update directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDirective {
    /// The server has nothing newer than what the client runs.
    NoUpdateAvailable {
        /// Signing scope carried in the directive's `extra` object.
        signing_info: Option<SigningInfo>,
    },
    /// The client should go back to its embedded update.
    RollBackToEmbedded(RollBackToEmbeddedDirective),
}

#[derive(Deserialize)]
struct RawDirective {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: Option<RawParameters>,
    #[serde(default)]
    extra: Option<RawExtra>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameters {
    #[serde(default)]
    commit_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtra {
    #[serde(default)]
    signing_info: Option<SigningInfo>,
}

impl UpdateDirective {
    /// Decode a directive from the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveError::Json`] if the body is not a JSON object with a
    /// `type` field, [`DirectiveError::UnknownType`] for unrecognized types, and
    /// [`DirectiveError::MissingParameter`] when a roll back has no commit time.
    pub fn from_json(body: &[u8]) -> Result<Self, DirectiveError> {
        let raw: RawDirective = serde_json::from_slice(body)?;
        let signing_info = raw.extra.and_then(|extra| extra.signing_info);

        match raw.kind.as_str() {
            "noUpdateAvailable" => Ok(Self::NoUpdateAvailable { signing_info }),
            "rollBackToEmbedded" => {
                let commit_time = raw.parameters.and_then(|p| p.commit_time).ok_or(
                    DirectiveError::MissingParameter {
                        kind: "rollBackToEmbedded",
                        parameter: "commitTime",
                    },
                )?;
                Ok(Self::RollBackToEmbedded(RollBackToEmbeddedDirective {
                    commit_time,
                    signing_info,
                }))
            }
            other => Err(DirectiveError::UnknownType(other.to_string())),
        }
    }

    /// Signing scope carried by the directive, if any.
    pub fn signing_info(&self) -> Option<&SigningInfo> {
        match self {
            Self::NoUpdateAvailable { signing_info } => signing_info.as_ref(),
            Self::RollBackToEmbedded(directive) => directive.signing_info.as_ref(),
        }
    }
}
