use super::crypto::{self, SignatureScheme};
use super::{CodeSigningAlgorithm, CodeSigningError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

/// Private extension carrying `"<projectId>,<scopeKey>"`.
pub const PROJECT_INFORMATION_OID: &str =
    "1.2.840.113556.1.8000.2554.43437.254.128.102.157.7894389.20439.2.1";

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

// DER UTF8String tag, for extension values that wrap the text.
const UTF8_STRING_TAG: u8 = 0x0c;

/// Project identity a certificate is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInformation {
    /// EAS project identifier.
    pub project_id: String,
    /// Publisher/app namespace.
    pub scope_key: String,
}

impl ProjectInformation {
    fn parse(value: &[u8]) -> Result<Self, CodeSigningError> {
        let text = unwrap_utf8_string(value).unwrap_or(value);
        let text = std::str::from_utf8(text).map_err(|_| {
            CodeSigningError::InvalidCertificate("project information is not UTF-8".into())
        })?;

        let mut components = text.split(',').map(str::trim);
        match (components.next(), components.next(), components.next()) {
            (Some(project_id), Some(scope_key), None) => Ok(Self {
                project_id: project_id.to_string(),
                scope_key: scope_key.to_string(),
            }),
            _ => Err(CodeSigningError::InvalidCertificate(format!(
                "project information must be \"projectId,scopeKey\", got {text:?}"
            ))),
        }
    }
}

/// Contents of a DER UTF8String, or `None` when `value` is not exactly one.
fn unwrap_utf8_string(value: &[u8]) -> Option<&[u8]> {
    let (&tag, rest) = value.split_first()?;
    if tag != UTF8_STRING_TAG {
        return None;
    }
    let (&first, rest) = rest.split_first()?;
    let (len, contents) = match first {
        0x00..=0x7f => (usize::from(first), rest),
        0x81 => {
            let (&len, contents) = rest.split_first()?;
            (usize::from(len), contents)
        }
        0x82 => {
            let [hi, lo, contents @ ..] = rest else {
                return None;
            };
            (usize::from(u16::from_be_bytes([*hi, *lo])), contents)
        }
        _ => return None,
    };
    (len == contents.len()).then_some(contents)
}

/// A parsed X.509 certificate.
///
/// Only the fields chain validation and signature checks need are kept; the
/// original DER stays available for fingerprinting.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    subject_raw: Vec<u8>,
    issuer: String,
    issuer_raw: Vec<u8>,
    spki_der: Vec<u8>,
    tbs_der: Vec<u8>,
    signature_algorithm: String,
    signature: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    is_ca: bool,
    path_len_constraint: Option<u32>,
    digital_signature: bool,
    code_signing: bool,
    project_information: Option<ProjectInformation>,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::InvalidCertificate`] when the DER is
    /// malformed, has trailing data or carries duplicate/invalid extensions.
    pub fn from_der(der: &[u8]) -> Result<Self, CodeSigningError> {
        let (rest, cert) = X509Certificate::from_der(der)
            .map_err(|e| CodeSigningError::InvalidCertificate(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CodeSigningError::InvalidCertificate(
                "trailing data after certificate".into(),
            ));
        }

        let invalid = |e: X509Error| CodeSigningError::InvalidCertificate(e.to_string());

        let (is_ca, path_len_constraint) = cert
            .basic_constraints()
            .map_err(invalid)?
            .map_or((false, None), |bc| (bc.value.ca, bc.value.path_len_constraint));
        let digital_signature = cert
            .key_usage()
            .map_err(invalid)?
            .is_some_and(|ku| ku.value.digital_signature());
        let code_signing = cert
            .extended_key_usage()
            .map_err(invalid)?
            .is_some_and(|eku| eku.value.code_signing);

        let project_information = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == PROJECT_INFORMATION_OID)
            .map(|ext| ProjectInformation::parse(ext.value))
            .transpose()?;

        let validity = cert.validity();

        Ok(Self {
            der: der.to_vec(),
            subject: cert.subject().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer: cert.issuer().to_string(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            spki_der: cert.public_key().raw.to_vec(),
            tbs_der: cert.tbs_certificate.as_ref().to_vec(),
            signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
            not_before: to_utc(validity.not_before)?,
            not_after: to_utc(validity.not_after)?,
            is_ca,
            path_len_constraint,
            digital_signature,
            code_signing,
            project_information,
        })
    }

    /// Parse a single PEM `CERTIFICATE` block. Surrounding text is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::InvalidCertificate`] when no block is
    /// present, its body is not base64, or the DER inside is malformed.
    pub fn from_pem(pem: &str) -> Result<Self, CodeSigningError> {
        let block = pem_blocks(pem).next().ok_or_else(|| {
            CodeSigningError::InvalidCertificate("no PEM certificate block found".into())
        })?;
        Self::from_der(&decode_pem_block(block)?)
    }

    /// DER encoding as received.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name, RFC 4514 style.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name, RFC 4514 style.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Basic constraints `cA` flag.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Basic constraints `pathLenConstraint`, `None` when unlimited.
    pub fn path_len_constraint(&self) -> Option<u32> {
        self.path_len_constraint
    }

    /// Project scope carried in the private extension.
    pub fn project_information(&self) -> Option<&ProjectInformation> {
        self.project_information.as_ref()
    }

    /// Whether the certificate may sign code: digital signature key usage
    /// and code signing extended key usage.
    pub fn is_code_signing(&self) -> bool {
        self.digital_signature && self.code_signing
    }

    /// Whether issuer and subject names are byte-identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// Whether this certificate's issuer name is `issuer`'s subject name.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.issuer_raw == issuer.subject_raw
    }

    /// Check the validity window against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::CertificateNotYetValid`] or
    /// [`CodeSigningError::CertificateExpired`].
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), CodeSigningError> {
        if now < self.not_before {
            return Err(CodeSigningError::CertificateNotYetValid {
                subject: self.subject.clone(),
                not_before: self.not_before,
            });
        }
        if now > self.not_after {
            return Err(CodeSigningError::CertificateExpired {
                subject: self.subject.clone(),
                not_after: self.not_after,
            });
        }
        Ok(())
    }

    /// Verify this certificate's own signature with `issuer`'s public key.
    ///
    /// # Errors
    ///
    /// Returns an error when the signature algorithm is unsupported or the
    /// issuer key cannot be used for it.
    pub fn is_signed_by(&self, issuer: &Certificate) -> Result<bool, CodeSigningError> {
        let scheme = SignatureScheme::from_oid(&self.signature_algorithm).ok_or_else(|| {
            CodeSigningError::UnsupportedCertificateAlgorithm(self.signature_algorithm.clone())
        })?;
        crypto::verify_signature(&issuer.spki_der, scheme, &self.tbs_der, &self.signature)
    }

    /// Verify a detached signature over `message` with this certificate's key.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::UnsupportedKey`] when the key does not fit
    /// `algorithm`.
    pub fn verify(
        &self,
        algorithm: CodeSigningAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, CodeSigningError> {
        crypto::verify_signature(&self.spki_der, algorithm.into(), message, signature)
    }

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fn sha256_fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }
}

/// Split a concatenation of PEM certificates into parsed certificates, in order.
///
/// Text outside `BEGIN`/`END CERTIFICATE` markers is ignored; an input with no
/// blocks yields an empty vector.
///
/// # Errors
///
/// Returns [`CodeSigningError::InvalidCertificate`] for the first block that
/// does not decode.
pub fn split_certificate_chain(pem_chain: &str) -> Result<Vec<Certificate>, CodeSigningError> {
    pem_blocks(pem_chain)
        .map(|block| Certificate::from_der(&decode_pem_block(block)?))
        .collect()
}

/// Bodies between each `BEGIN`/`END` marker pair.
fn pem_blocks(input: &str) -> impl Iterator<Item = &str> {
    let mut rest = input;
    std::iter::from_fn(move || {
        let start = rest.find(PEM_BEGIN)? + PEM_BEGIN.len();
        let len = rest[start..].find(PEM_END)?;
        let body = &rest[start..start + len];
        rest = &rest[start + len + PEM_END.len()..];
        Some(body)
    })
}

fn decode_pem_block(body: &str) -> Result<Vec<u8>, CodeSigningError> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| CodeSigningError::InvalidCertificate(format!("invalid PEM body: {e}")))
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>, CodeSigningError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        CodeSigningError::InvalidCertificate(format!("validity time out of range: {time}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = include_str!("../../tests/fixtures/root.pem");
    const INTERMEDIATE: &str = include_str!("../../tests/fixtures/intermediate.pem");
    const LEAF: &str = include_str!("../../tests/fixtures/leaf.pem");

    #[test]
    fn parses_leaf_fields() -> anyhow::Result<()> {
        let leaf = Certificate::from_pem(LEAF)?;
        assert!(leaf.is_code_signing());
        assert!(!leaf.is_ca());
        assert!(!leaf.is_self_issued());
        assert_eq!(leaf.subject(), "CN=Updates Test Code Signing");
        assert_eq!(leaf.issuer(), "CN=Updates Test Intermediate CA");
        assert_eq!(
            leaf.project_information(),
            Some(&ProjectInformation {
                project_id: "285dc9ca-a25d-4f60-93be-36dc312266d7".into(),
                scope_key: "@test/app".into(),
            })
        );
        Ok(())
    }

    #[test]
    fn intermediate_carries_path_len_zero() -> anyhow::Result<()> {
        let intermediate = Certificate::from_pem(INTERMEDIATE)?;
        assert!(intermediate.is_ca());
        assert_eq!(intermediate.path_len_constraint(), Some(0));
        Ok(())
    }

    #[test]
    fn root_is_self_issued_and_self_signed() -> anyhow::Result<()> {
        let root = Certificate::from_pem(ROOT)?;
        assert!(root.is_self_issued());
        assert!(root.is_signed_by(&root)?);
        Ok(())
    }

    #[test]
    fn leaf_is_not_signed_by_root() -> anyhow::Result<()> {
        let leaf = Certificate::from_pem(LEAF)?;
        let root = Certificate::from_pem(ROOT)?;
        assert!(!leaf.is_signed_by(&root)?);
        Ok(())
    }

    #[test]
    fn splits_concatenated_chain_ignoring_surrounding_text() -> anyhow::Result<()> {
        let chain = format!("junk before\n{LEAF}\n\n  {INTERMEDIATE}trailing");
        let certs = split_certificate_chain(&chain)?;
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[1].subject(), "CN=Updates Test Intermediate CA");
        Ok(())
    }

    #[test]
    fn empty_input_yields_no_certificates() -> anyhow::Result<()> {
        assert!(split_certificate_chain("")?.is_empty());
        assert!(Certificate::from_pem("").is_err());
        Ok(())
    }

    #[test]
    fn fingerprint_is_lowercase_hex_sha256() -> anyhow::Result<()> {
        let fingerprint = Certificate::from_pem(ROOT)?.sha256_fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        Ok(())
    }

    #[test]
    fn project_information_accepts_der_wrapped_value() -> anyhow::Result<()> {
        let text = b"abc,@owner/slug";
        let mut value = vec![UTF8_STRING_TAG, text.len() as u8];
        value.extend_from_slice(text);
        let info = ProjectInformation::parse(&value)?;
        assert_eq!(info.project_id, "abc");
        assert_eq!(info.scope_key, "@owner/slug");
        Ok(())
    }

    #[test]
    fn project_information_accepts_long_form_der_lengths() -> anyhow::Result<()> {
        let scope_key = format!("@owner/{}", "a".repeat(200));
        let text = format!("285dc9ca-a25d-4f60-93be-36dc312266d7,{scope_key}");

        let mut one_byte = vec![UTF8_STRING_TAG, 0x81, u8::try_from(text.len())?];
        one_byte.extend_from_slice(text.as_bytes());
        assert_eq!(ProjectInformation::parse(&one_byte)?.scope_key, scope_key);

        let mut two_bytes = vec![UTF8_STRING_TAG, 0x82];
        two_bytes.extend_from_slice(&u16::try_from(text.len())?.to_be_bytes());
        two_bytes.extend_from_slice(text.as_bytes());
        assert_eq!(ProjectInformation::parse(&two_bytes)?.scope_key, scope_key);
        Ok(())
    }

    #[test]
    fn project_information_requires_two_components() {
        assert!(ProjectInformation::parse(b"only-one").is_err());
        assert!(ProjectInformation::parse(b"a,b,c").is_err());
    }
}
