use super::{Certificate, CodeSigningError, ProjectInformation};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Outcome of a successful chain validation.
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    /// The trusted leaf. Manifest signatures are checked against its key.
    pub code_signing_certificate: Certificate,
    /// The leaf's own project scope, if it declares one.
    pub project_information: Option<ProjectInformation>,
}

/// An ordered certificate chain, leaf first and root last.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    /// Wrap certificates ordered leaf to root. A single certificate is both.
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self { certificates }
    }

    /// Certificates in leaf-to-root order.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Validate the chain at `now`.
    ///
    /// Checks run in a fixed order and the first violation is returned:
    /// emptiness, validity windows, leaf usage, issuer linkage and link
    /// signatures, root self-signature, CA flags, path lengths, and finally
    /// project information consistency from the root down.
    ///
    /// # Errors
    ///
    /// Returns the [`CodeSigningError`] describing the first violation.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidatedChain, CodeSigningError> {
        let (leaf, root) = match self.certificates.as_slice() {
            [] => return Err(CodeSigningError::NoCertificates),
            [leaf, .., root] => (leaf, root),
            [only] => (only, only),
        };

        for certificate in &self.certificates {
            certificate.check_validity(now)?;
        }

        if !leaf.is_code_signing() {
            return Err(CodeSigningError::NotCodeSigningCertificate);
        }

        for pair in self.certificates.windows(2) {
            let (child, issuer) = (&pair[0], &pair[1]);
            if !child.is_issued_by(issuer) {
                return Err(CodeSigningError::CertificatesDoNotChain);
            }
            if !child.is_signed_by(issuer)? {
                return Err(CodeSigningError::InvalidCertificateSignature {
                    subject: child.subject().to_string(),
                    issuer: issuer.subject().to_string(),
                });
            }
        }

        if !root.is_self_issued() {
            return Err(CodeSigningError::RootNotSelfSigned);
        }
        if !root.is_signed_by(root)? {
            return Err(CodeSigningError::RootSignatureInvalid);
        }

        for (position, issuer) in self.certificates.iter().enumerate().skip(1) {
            if !issuer.is_ca() {
                return Err(CodeSigningError::IssuerNotCertificateAuthority);
            }
            // Intermediates strictly between this issuer and the leaf.
            let below = position - 1;
            if let Some(limit) = issuer.path_len_constraint()
                && below > limit as usize
            {
                return Err(CodeSigningError::PathLenConstraintViolated);
            }
        }

        let mut constraint: Option<&ProjectInformation> = None;
        for certificate in self.certificates.iter().rev() {
            if let Some(info) = certificate.project_information() {
                if constraint.is_some_and(|ancestor| ancestor != info) {
                    return Err(CodeSigningError::ProjectInformationNotSubset);
                }
                constraint = Some(info);
            }
        }

        debug!(
            leaf = %leaf.subject(),
            root = %root.subject(),
            root_fingerprint = %root.sha256_fingerprint(),
            length = self.certificates.len(),
            "certificate chain validated"
        );

        Ok(ValidatedChain {
            code_signing_certificate: leaf.clone(),
            project_information: leaf.project_information().cloned(),
        })
    }
}
