use super::signature_header::{ALGORITHM_KEY, DEFAULT_KEY_ID, KEY_ID_KEY, SIGNATURE_KEY};
use super::{
    Certificate, CertificateChain, CodeSigningAlgorithm, CodeSigningError, ProjectInformation,
    SignatureHeaderInfo, split_certificate_chain,
};
use crate::structured_headers::{self, BareItem, Dictionary, Item};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Key identifier and algorithm the client expects signatures to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSigningMetadata {
    /// Expected `keyid`.
    pub key_id: String,
    /// Expected `alg`.
    pub algorithm: CodeSigningAlgorithm,
}

impl Default for CodeSigningMetadata {
    fn default() -> Self {
        Self {
            key_id: DEFAULT_KEY_ID.to_string(),
            algorithm: CodeSigningAlgorithm::default(),
        }
    }
}

impl CodeSigningMetadata {
    /// Read `keyid` and `alg` from a metadata map, defaulting each when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::InvalidAlgorithm`] for an unknown `alg`.
    pub fn from_map(map: Option<&BTreeMap<String, String>>) -> Result<Self, CodeSigningError> {
        let get = |key: &str| map.and_then(|m| m.get(key)).map(String::as_str);
        Ok(Self {
            key_id: get(KEY_ID_KEY).unwrap_or(DEFAULT_KEY_ID).to_string(),
            algorithm: CodeSigningAlgorithm::parse_or_default(get(ALGORITHM_KEY))?,
        })
    }
}

/// Outcome classification of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// The signature verified.
    Valid,
    /// The signature did not verify.
    Invalid,
    /// No signature was present and unsigned manifests are allowed.
    Skipped,
}

/// Result of [`CodeSigningConfiguration::validate_signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureValidationResult {
    /// Outcome.
    pub status: ValidationStatus,
    /// Project scope of the validated leaf, when verified through a chain.
    pub project_information: Option<ProjectInformation>,
}

impl SignatureValidationResult {
    fn new(status: ValidationStatus, project_information: Option<ProjectInformation>) -> Self {
        Self {
            status,
            project_information,
        }
    }

    /// Check that a manifest or directive claims the scope the certificate allows.
    ///
    /// Passes when verification produced no project information.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::ProjectScopeMismatch`] when either claimed
    /// value differs from the certificate's.
    pub fn check_project_scope(
        &self,
        eas_project_id: Option<&str>,
        scope_key: Option<&str>,
    ) -> Result<(), CodeSigningError> {
        let Some(expected) = &self.project_information else {
            return Ok(());
        };
        if eas_project_id == Some(expected.project_id.as_str())
            && scope_key == Some(expected.scope_key.as_str())
        {
            Ok(())
        } else {
            Err(CodeSigningError::ProjectScopeMismatch)
        }
    }
}

/// Client-side code signing settings. Immutable once built.
#[derive(Debug, Clone)]
pub struct CodeSigningConfiguration {
    certificate: Certificate,
    metadata: CodeSigningMetadata,
    include_manifest_response_certificate_chain: bool,
    allow_unsigned_manifests: bool,
}

impl CodeSigningConfiguration {
    /// Build a configuration from the embedded certificate PEM and metadata map.
    ///
    /// # Errors
    ///
    /// Fails when the certificate does not parse or the metadata names an
    /// unknown algorithm.
    pub fn new(
        certificate_pem: &str,
        metadata: Option<&BTreeMap<String, String>>,
        include_manifest_response_certificate_chain: bool,
        allow_unsigned_manifests: bool,
    ) -> Result<Self, CodeSigningError> {
        Ok(Self {
            certificate: Certificate::from_pem(certificate_pem)?,
            metadata: CodeSigningMetadata::from_map(metadata)?,
            include_manifest_response_certificate_chain,
            allow_unsigned_manifests,
        })
    }

    /// The configured trust anchor.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Expected key identifier and algorithm.
    pub fn metadata(&self) -> &CodeSigningMetadata {
        &self.metadata
    }

    /// Whether a response-supplied chain is validated against the anchor.
    pub fn include_manifest_response_certificate_chain(&self) -> bool {
        self.include_manifest_response_certificate_chain
    }

    /// Whether a missing signature is tolerated.
    pub fn allow_unsigned_manifests(&self) -> bool {
        self.allow_unsigned_manifests
    }

    /// Value of the header advertising which signatures the client accepts,
    /// e.g. `sig, keyid="root", alg="rsa-v1_5-sha256"`.
    pub fn accept_signature_header(&self) -> String {
        let mut dictionary = Dictionary::new();
        dictionary.insert(SIGNATURE_KEY, Item::new(true));
        dictionary.insert(KEY_ID_KEY, Item::new(self.metadata.key_id.as_str()));
        dictionary.insert(
            ALGORITHM_KEY,
            Item::new(BareItem::String(self.metadata.algorithm.name().to_string())),
        );
        structured_headers::serialize_dictionary(&dictionary)
    }

    /// Validate `body` against the signature header at the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_signature_at`].
    pub fn validate_signature(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
        manifest_response_certificate_chain: Option<&str>,
    ) -> Result<SignatureValidationResult, CodeSigningError> {
        self.validate_signature_at(
            signature_header,
            body,
            manifest_response_certificate_chain,
            Utc::now(),
        )
    }

    /// Validate `body` against the signature header, checking certificate
    /// validity windows at `now`.
    ///
    /// A signature that does not verify is reported as
    /// [`ValidationStatus::Invalid`].
    ///
    /// # Errors
    ///
    /// Fails when the signature is missing and unsigned manifests are not
    /// allowed, the header is malformed, its `keyid` is not the configured
    /// one, or the response chain does not validate.
    pub fn validate_signature_at(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
        manifest_response_certificate_chain: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SignatureValidationResult, CodeSigningError> {
        let Some(signature_header) = signature_header else {
            if self.allow_unsigned_manifests {
                debug!("no signature header, unsigned manifests allowed");
                return Ok(SignatureValidationResult::new(ValidationStatus::Skipped, None));
            }
            return Err(CodeSigningError::MissingSignature);
        };

        let header = SignatureHeaderInfo::parse(signature_header)?;
        if header.key_id != self.metadata.key_id {
            return Err(CodeSigningError::KeyIdMismatch(header.key_id));
        }
        if header.algorithm != self.metadata.algorithm {
            warn!(
                signature = %header.algorithm,
                configured = %self.metadata.algorithm,
                "signature algorithm differs from configuration, using the signature's"
            );
        }

        let (signer, project_information) = match manifest_response_certificate_chain {
            Some(chain) if self.include_manifest_response_certificate_chain => {
                let mut certificates = split_certificate_chain(chain)?;
                certificates.push(self.certificate.clone());
                let validated = CertificateChain::new(certificates).validate(now)?;
                (validated.code_signing_certificate, validated.project_information)
            }
            _ => (self.certificate.clone(), None),
        };

        let signature = header.signature_bytes()?;
        let status = if signer.verify(header.algorithm, body, &signature)? {
            info!(signer = %signer.subject(), "manifest signature valid");
            ValidationStatus::Valid
        } else {
            warn!(signer = %signer.subject(), "manifest signature invalid");
            ValidationStatus::Invalid
        };

        Ok(SignatureValidationResult::new(status, project_information))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELF_SIGNED: &str = include_str!("../../tests/fixtures/self-signed.pem");

    #[test]
    fn accept_header_uses_defaults() -> anyhow::Result<()> {
        let config = CodeSigningConfiguration::new(SELF_SIGNED, None, false, false)?;
        assert_eq!(
            config.accept_signature_header(),
            r#"sig, keyid="root", alg="rsa-v1_5-sha256""#
        );
        Ok(())
    }

    #[test]
    fn accept_header_escapes_key_id() -> anyhow::Result<()> {
        let metadata = BTreeMap::from([(KEY_ID_KEY.to_string(), r#"my"key\id"#.to_string())]);
        let config = CodeSigningConfiguration::new(SELF_SIGNED, Some(&metadata), false, false)?;
        assert_eq!(
            config.accept_signature_header(),
            r#"sig, keyid="my\"key\\id", alg="rsa-v1_5-sha256""#
        );
        Ok(())
    }

    #[test]
    fn unknown_configured_algorithm_is_rejected() {
        let metadata = BTreeMap::from([(ALGORITHM_KEY.to_string(), "fake".to_string())]);
        let err = CodeSigningConfiguration::new(SELF_SIGNED, Some(&metadata), false, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid code signing algorithm name: fake");
    }

    #[test]
    fn missing_signature_is_skipped_only_when_allowed() -> anyhow::Result<()> {
        let lenient = CodeSigningConfiguration::new(SELF_SIGNED, None, false, true)?;
        let result = lenient.validate_signature(None, b"{}", None)?;
        assert_eq!(result.status, ValidationStatus::Skipped);
        assert!(result.project_information.is_none());

        let strict = CodeSigningConfiguration::new(SELF_SIGNED, None, false, false)?;
        let err = strict.validate_signature(None, b"{}", None).unwrap_err();
        assert!(matches!(err, CodeSigningError::MissingSignature));
        Ok(())
    }

    #[test]
    fn foreign_key_id_is_a_configuration_error() -> anyhow::Result<()> {
        let config = CodeSigningConfiguration::new(SELF_SIGNED, None, false, false)?;
        let err = config
            .validate_signature(Some(r#"sig="AQID", keyid="other""#), b"{}", None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Key with keyid=other from signature not found in client configuration"
        );
        Ok(())
    }

    #[test]
    fn project_scope_check() {
        let unscoped = SignatureValidationResult::new(ValidationStatus::Valid, None);
        assert!(unscoped.check_project_scope(None, None).is_ok());

        let scoped = SignatureValidationResult::new(
            ValidationStatus::Valid,
            Some(ProjectInformation {
                project_id: "p".into(),
                scope_key: "@a/b".into(),
            }),
        );
        assert!(scoped.check_project_scope(Some("p"), Some("@a/b")).is_ok());
        assert!(matches!(
            scoped.check_project_scope(Some("p"), Some("@a/c")),
            Err(CodeSigningError::ProjectScopeMismatch)
        ));
        assert!(scoped.check_project_scope(None, Some("@a/b")).is_err());
    }
}
