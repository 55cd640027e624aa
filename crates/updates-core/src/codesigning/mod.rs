//! Manifest code signing.
//!
//! A publisher signs every manifest (and directive) body with the private key
//! of a code signing certificate. The client holds a trust anchor in its
//! configuration and, optionally, accepts an intermediate chain delivered
//! with the manifest response. Validation is split into:
//!
//! - [`certificate`]: parsed certificates and the project-information extension
//! - [`chain`]: leaf-to-root chain validation
//! - [`signature_header`]: the `expo-signature` structured header
//! - [`configuration`]: the client-side configuration tying it together
//! - [`crypto`]: the narrow signature-verification capability everything above uses

pub mod algorithm;
pub mod certificate;
pub mod chain;
pub mod configuration;
pub mod crypto;
pub mod signature_header;

pub use algorithm::CodeSigningAlgorithm;
pub use certificate::{Certificate, ProjectInformation, split_certificate_chain};
pub use chain::{CertificateChain, ValidatedChain};
pub use configuration::{
    CodeSigningConfiguration, CodeSigningMetadata, SignatureValidationResult, ValidationStatus,
};
pub use signature_header::SignatureHeaderInfo;

use crate::structured_headers::StructuredHeaderError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Everything that can go wrong while establishing trust in a signed body.
///
/// A signature that simply does not match is *not* an error; it is reported
/// as [`ValidationStatus::Invalid`]. These variants cover malformed input,
/// untrusted chains and client misconfiguration.
#[derive(Error, Debug)]
pub enum CodeSigningError {
    /// The chain passed to the validator was empty.
    #[error("No code signing certificates provided")]
    NoCertificates,

    /// A certificate in the chain is past its `notAfter`.
    #[error("Certificate expired at {not_after}")]
    CertificateExpired {
        /// Subject of the expired certificate.
        subject: String,
        /// End of its validity window.
        not_after: DateTime<Utc>,
    },

    /// A certificate in the chain is before its `notBefore`.
    #[error("Certificate not yet valid before {not_before}")]
    CertificateNotYetValid {
        /// Subject of the certificate.
        subject: String,
        /// Start of its validity window.
        not_before: DateTime<Utc>,
    },

    /// The leaf lacks the digital signature key usage or code signing extended key usage.
    #[error(
        "First certificate in chain is not a code signing certificate. Must have X509v3 Key Usage: Digital Signature and X509v3 Extended Key Usage: Code Signing"
    )]
    NotCodeSigningCertificate,

    /// A certificate's issuer name is not the next certificate's subject name.
    #[error("Certificates do not chain")]
    CertificatesDoNotChain,

    /// A certificate's signature does not verify against its issuer's public key.
    #[error("Invalid certificate signature: {subject} was not signed by {issuer}")]
    InvalidCertificateSignature {
        /// Subject of the certificate whose signature failed.
        subject: String,
        /// Subject of the issuer it was checked against.
        issuer: String,
    },

    /// The last certificate's issuer is not its own subject.
    #[error("Root certificate not self-signed")]
    RootNotSelfSigned,

    /// The last certificate names itself as issuer but its signature does not verify.
    #[error(
        "Root certificate not self-signed: signature does not verify against its own public key"
    )]
    RootSignatureInvalid,

    /// An issuing certificate is not a CA.
    #[error("Non-leaf certificate subject must be a Certificate Authority")]
    IssuerNotCertificateAuthority,

    /// An issuing certificate has more intermediates below it than its path length allows.
    #[error("pathLenConstraint violated by intermediate certificate")]
    PathLenConstraintViolated,

    /// A certificate's project information widens or contradicts an ancestor's.
    #[error("Expo project information must be a subset of or equal to that of parent certificates")]
    ProjectInformationNotSubset,

    /// DER/PEM decoding or extension parsing failed.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A public key could not be used for the requested algorithm.
    #[error("Unsupported public key: {0}")]
    UnsupportedKey(String),

    /// A certificate is signed with an algorithm this client cannot verify.
    #[error("Unsupported certificate signature algorithm: {0}")]
    UnsupportedCertificateAlgorithm(String),

    /// The signature header is not a valid structured dictionary.
    #[error("Invalid expo-signature header: {0}")]
    InvalidSignatureHeader(#[from] StructuredHeaderError),

    /// The signature header has no `sig` string member.
    #[error("Structured field sig not found in expo-signature header")]
    MissingSignatureField,

    /// The signature is not valid base64.
    #[error("Invalid base64 signature: {0}")]
    InvalidSignatureEncoding(String),

    /// An `alg` value does not name a supported algorithm.
    #[error("Invalid code signing algorithm name: {0}")]
    InvalidAlgorithm(String),

    /// No signature was supplied and unsigned manifests are not allowed.
    #[error("No expo-signature header specified")]
    MissingSignature,

    /// The signature names a key the client is not configured with.
    #[error("Key with keyid={0} from signature not found in client configuration")]
    KeyIdMismatch(String),

    /// The signing certificate is scoped to a different project than the body claims.
    #[error("Invalid certificate for manifest project ID or scope key")]
    ProjectScopeMismatch,
}
