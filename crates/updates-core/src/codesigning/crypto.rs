//! Signature verification over DER-encoded public keys.
//!
//! Everything else in [`super`] goes through [`verify_signature`], so the set
//! of accepted schemes is decided in exactly one place.

use super::{CodeSigningAlgorithm, CodeSigningError};
use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha2::{Sha256, Sha384, Sha512};

const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";

/// A concrete (key type, hash) pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RsaPkcs1Sha256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RsaPkcs1Sha384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RsaPkcs1Sha512,
    /// ECDSA over P-256 with SHA-256, DER signature.
    EcdsaP256Sha256,
    /// ECDSA over P-384 with SHA-384, DER signature.
    EcdsaP384Sha384,
}

impl SignatureScheme {
    /// Map an X.509 `signatureAlgorithm` OID to a scheme.
    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            OID_SHA256_WITH_RSA => Some(Self::RsaPkcs1Sha256),
            OID_SHA384_WITH_RSA => Some(Self::RsaPkcs1Sha384),
            OID_SHA512_WITH_RSA => Some(Self::RsaPkcs1Sha512),
            OID_ECDSA_WITH_SHA256 => Some(Self::EcdsaP256Sha256),
            OID_ECDSA_WITH_SHA384 => Some(Self::EcdsaP384Sha384),
            _ => None,
        }
    }
}

impl From<CodeSigningAlgorithm> for SignatureScheme {
    fn from(algorithm: CodeSigningAlgorithm) -> Self {
        match algorithm {
            CodeSigningAlgorithm::RsaSha256 => Self::RsaPkcs1Sha256,
        }
    }
}

/// Verify `signature` over `message` with the key in `spki_der`.
///
/// Returns `Ok(false)` when the signature is well-formed input that simply
/// does not match, including undecodable signature bytes.
///
/// # Errors
///
/// Returns [`CodeSigningError::UnsupportedKey`] when `spki_der` is not a key
/// of the type the scheme requires.
pub fn verify_signature(
    spki_der: &[u8],
    scheme: SignatureScheme,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, CodeSigningError> {
    match scheme {
        SignatureScheme::RsaPkcs1Sha256 => {
            verify_rsa(RsaVerifyingKey::<Sha256>::new(rsa_key(spki_der)?), message, signature)
        }
        SignatureScheme::RsaPkcs1Sha384 => {
            verify_rsa(RsaVerifyingKey::<Sha384>::new(rsa_key(spki_der)?), message, signature)
        }
        SignatureScheme::RsaPkcs1Sha512 => {
            verify_rsa(RsaVerifyingKey::<Sha512>::new(rsa_key(spki_der)?), message, signature)
        }
        SignatureScheme::EcdsaP256Sha256 => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| CodeSigningError::UnsupportedKey(format!("P-256: {e}")))?;
            let Ok(sig) = p256::ecdsa::Signature::from_der(signature) else {
                return Ok(false);
            };
            Ok(key.verify(message, &sig).is_ok())
        }
        SignatureScheme::EcdsaP384Sha384 => {
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| CodeSigningError::UnsupportedKey(format!("P-384: {e}")))?;
            let Ok(sig) = p384::ecdsa::Signature::from_der(signature) else {
                return Ok(false);
            };
            Ok(key.verify(message, &sig).is_ok())
        }
    }
}

fn rsa_key(spki_der: &[u8]) -> Result<RsaPublicKey, CodeSigningError> {
    RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| CodeSigningError::UnsupportedKey(format!("RSA: {e}")))
}

fn verify_rsa<V>(key: V, message: &[u8], signature: &[u8]) -> Result<bool, CodeSigningError>
where
    V: Verifier<RsaSignature>,
{
    let Ok(sig) = RsaSignature::try_from(signature) else {
        return Ok(false);
    };
    Ok(key.verify(message, &sig).is_ok())
}
