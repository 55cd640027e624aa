use super::{CodeSigningAlgorithm, CodeSigningError};
use crate::structured_headers::{self, Member};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Dictionary key of the base64 signature.
pub const SIGNATURE_KEY: &str = "sig";
/// Dictionary key of the signing key identifier.
pub const KEY_ID_KEY: &str = "keyid";
/// Dictionary key of the algorithm name.
pub const ALGORITHM_KEY: &str = "alg";
/// Key identifier assumed when the header omits `keyid`.
pub const DEFAULT_KEY_ID: &str = "root";

/// A parsed `expo-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaderInfo {
    /// Base64 signature text as sent.
    pub signature: String,
    /// Identifier of the key that produced the signature.
    pub key_id: String,
    /// Algorithm the signature was produced with.
    pub algorithm: CodeSigningAlgorithm,
}

impl SignatureHeaderInfo {
    /// Parse `sig="<base64>"[, keyid="<id>"][, alg="<name>"]`.
    ///
    /// # Errors
    ///
    /// Fails when the header is not a structured dictionary, `sig` is missing
    /// or not a string, or `alg` names an unknown algorithm.
    pub fn parse(header: &str) -> Result<Self, CodeSigningError> {
        let dictionary = structured_headers::parse_dictionary(header)?;
        let string_member = |key: &str| {
            dictionary
                .get(key)
                .and_then(Member::as_item)
                .and_then(|item| item.value.as_string())
        };

        let signature =
            string_member(SIGNATURE_KEY).ok_or(CodeSigningError::MissingSignatureField)?;
        let key_id = string_member(KEY_ID_KEY).unwrap_or(DEFAULT_KEY_ID);
        let algorithm = CodeSigningAlgorithm::parse_or_default(string_member(ALGORITHM_KEY))?;

        Ok(Self {
            signature: signature.to_string(),
            key_id: key_id.to_string(),
            algorithm,
        })
    }

    /// Decode the signature to raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodeSigningError::InvalidSignatureEncoding`] when the text is not base64.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, CodeSigningError> {
        BASE64
            .decode(self.signature.trim())
            .map_err(|e| CodeSigningError::InvalidSignatureEncoding(e.to_string()))
    }
}
