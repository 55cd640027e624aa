//! Certificate chain validation against generated and fixture chains.

use chrono::{DateTime, TimeZone, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, date_time_ymd,
};
use updates_core::codesigning::{
    Certificate, CertificateChain, CodeSigningError, ProjectInformation, ValidatedChain,
    split_certificate_chain,
};

const PROJECT_INFORMATION_OID: &[u64] = &[
    1, 2, 840, 113_556, 1, 8000, 2554, 43437, 254, 128, 102, 157, 7_894_389, 20439, 2, 1,
];
const PROJECT: &str = "285dc9ca-a25d-4f60-93be-36dc312266d7,@test/app";

struct Issued {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Issued {
    fn parsed(&self) -> Certificate {
        Certificate::from_der(self.cert.der()).unwrap()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn issue(
    common_name: &str,
    issuer: Option<&Issued>,
    customize: impl FnOnce(&mut CertificateParams),
) -> Issued {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2099, 1, 1);
    customize(&mut params);
    let cert = match issuer {
        Some(issuer) => params.signed_by(&key, &issuer.cert, &issuer.key).unwrap(),
        None => params.self_signed(&key).unwrap(),
    };
    Issued { cert, key }
}

fn ca(path_len: Option<u8>) -> impl FnOnce(&mut CertificateParams) {
    move |params| {
        params.is_ca = IsCa::Ca(path_len.map_or(
            BasicConstraints::Unconstrained,
            BasicConstraints::Constrained,
        ));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    }
}

fn code_signing(params: &mut CertificateParams) {
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
}

fn with_project(params: &mut CertificateParams, value: &str) {
    params.custom_extensions.push(CustomExtension::from_oid_content(
        PROJECT_INFORMATION_OID,
        value.as_bytes().to_vec(),
    ));
}

/// Leaf, intermediate and root, all scoped to the same project.
fn scoped_chain() -> (Issued, Issued, Issued) {
    let root = issue("Root", None, |p| {
        ca(None)(p);
        with_project(p, PROJECT);
    });
    let intermediate = issue("Intermediate", Some(&root), |p| {
        ca(Some(0))(p);
        with_project(p, PROJECT);
    });
    let leaf = issue("Leaf", Some(&intermediate), |p| {
        code_signing(p);
        with_project(p, PROJECT);
    });
    (leaf, intermediate, root)
}

fn validate(certs: &[&Issued]) -> Result<ValidatedChain, CodeSigningError> {
    CertificateChain::new(certs.iter().map(|c| c.parsed()).collect()).validate(now())
}

#[test]
fn three_certificate_chain_yields_leaf_project_information() {
    let (leaf, intermediate, root) = scoped_chain();
    let validated = validate(&[&leaf, &intermediate, &root]).unwrap();

    assert_eq!(validated.code_signing_certificate.subject(), "CN=Leaf");
    assert_eq!(
        validated.project_information,
        Some(ProjectInformation {
            project_id: "285dc9ca-a25d-4f60-93be-36dc312266d7".into(),
            scope_key: "@test/app".into(),
        })
    );
}

#[test]
fn single_self_signed_code_signing_certificate_is_its_own_root() {
    let only = issue("Self Signed", None, code_signing);
    let validated = validate(&[&only]).unwrap();
    assert_eq!(validated.code_signing_certificate.subject(), "CN=Self Signed");
    assert!(validated.project_information.is_none());
}

#[test]
fn empty_chain_is_rejected() {
    let err = CertificateChain::new(Vec::new()).validate(now()).unwrap_err();
    assert_eq!(err.to_string(), "No code signing certificates provided");
}

#[test]
fn removing_the_intermediate_breaks_the_chain() {
    let (leaf, _intermediate, root) = scoped_chain();
    let err = validate(&[&leaf, &root]).unwrap_err();
    assert_eq!(err.to_string(), "Certificates do not chain");
}

#[test]
fn removing_the_root_leaves_an_unanchored_chain() {
    let (leaf, intermediate, _root) = scoped_chain();
    let err = validate(&[&leaf, &intermediate]).unwrap_err();
    assert_eq!(err.to_string(), "Root certificate not self-signed");
}

#[test]
fn expired_certificate_fails_at_any_position() {
    for position in 0..3 {
        let expire = |p: &mut CertificateParams, index: usize| {
            if index == position {
                p.not_after = date_time_ymd(2021, 1, 1);
            }
        };
        let root = issue("Root", None, |p| {
            ca(None)(p);
            expire(p, 2);
        });
        let intermediate = issue("Intermediate", Some(&root), |p| {
            ca(None)(p);
            expire(p, 1);
        });
        let leaf = issue("Leaf", Some(&intermediate), |p| {
            code_signing(p);
            expire(p, 0);
        });

        let err = validate(&[&leaf, &intermediate, &root]).unwrap_err();
        assert!(
            matches!(err, CodeSigningError::CertificateExpired { .. }),
            "position {position}: {err}"
        );
        assert!(err.to_string().starts_with("Certificate expired at"));
    }
}

#[test]
fn not_yet_valid_certificate_fails() {
    let only = issue("Future", None, |p| {
        code_signing(p);
        p.not_before = date_time_ymd(2030, 1, 1);
    });
    let err = validate(&[&only]).unwrap_err();
    assert!(matches!(err, CodeSigningError::CertificateNotYetValid { .. }));
}

#[test]
fn leaf_without_code_signing_usage_is_rejected() {
    let root = issue("Root", None, ca(None));
    let leaf = issue("Leaf", Some(&root), |p| {
        p.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    });
    let err = validate(&[&leaf, &root]).unwrap_err();
    assert!(matches!(err, CodeSigningError::NotCodeSigningCertificate));
}

#[test]
fn link_signed_by_the_wrong_key_is_reported_distinctly() {
    let root = issue("Root", None, ca(None));
    let intermediate = issue("Intermediate", Some(&root), ca(None));
    let impostor = issue("Intermediate", Some(&root), ca(None));
    let leaf = issue("Leaf", Some(&impostor), code_signing);

    let err = validate(&[&leaf, &intermediate, &root]).unwrap_err();
    assert!(
        matches!(err, CodeSigningError::InvalidCertificateSignature { .. }),
        "{err}"
    );
}

#[test]
fn root_naming_itself_but_signed_by_another_key_is_rejected() {
    let real = issue("Root", None, ca(None));
    let forged = issue("Root", Some(&real), code_signing);
    let err = validate(&[&forged]).unwrap_err();
    assert!(matches!(err, CodeSigningError::RootSignatureInvalid));
}

#[test]
fn non_ca_issuer_is_rejected() {
    let root = issue("Root", None, ca(None));
    let intermediate = issue("Intermediate", Some(&root), |p| {
        p.key_usages = vec![KeyUsagePurpose::KeyCertSign];
    });
    let leaf = issue("Leaf", Some(&intermediate), code_signing);

    let err = validate(&[&leaf, &intermediate, &root]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Non-leaf certificate subject must be a Certificate Authority"
    );
}

#[test]
fn path_length_counts_intermediates_below_the_issuer() {
    let strict_root = issue("Root", None, ca(Some(0)));
    let intermediate = issue("Intermediate", Some(&strict_root), ca(None));
    let leaf = issue("Leaf", Some(&intermediate), code_signing);
    let err = validate(&[&leaf, &intermediate, &strict_root]).unwrap_err();
    assert!(matches!(err, CodeSigningError::PathLenConstraintViolated));

    let root = issue("Root", None, ca(Some(1)));
    let intermediate = issue("Intermediate", Some(&root), ca(Some(0)));
    let leaf = issue("Leaf", Some(&intermediate), code_signing);
    assert!(validate(&[&leaf, &intermediate, &root]).is_ok());
}

#[test]
fn leaf_cannot_widen_ancestor_project_information() {
    let root = issue("Root", None, |p| {
        ca(None)(p);
        with_project(p, PROJECT);
    });
    let leaf = issue("Leaf", Some(&root), |p| {
        code_signing(p);
        with_project(p, "other-project,@other/app");
    });
    let err = validate(&[&leaf, &root]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expo project information must be a subset of or equal to that of parent certificates"
    );
}

#[test]
fn unscoped_ancestor_imposes_no_constraint() {
    let root = issue("Root", None, ca(None));
    let leaf = issue("Leaf", Some(&root), |p| {
        code_signing(p);
        with_project(p, "other-project,@other/app");
    });
    let validated = validate(&[&leaf, &root]).unwrap();
    assert_eq!(
        validated.project_information.map(|info| info.scope_key),
        Some("@other/app".to_string())
    );
}

#[test]
fn rsa_fixture_chain_validates_at_current_time() {
    let pem = [
        include_str!("fixtures/leaf.pem"),
        include_str!("fixtures/intermediate.pem"),
        include_str!("fixtures/root.pem"),
    ]
    .join("\n\n\n");
    let certificates = split_certificate_chain(&pem).unwrap();
    assert_eq!(certificates.len(), 3);

    let validated = CertificateChain::new(certificates).validate(Utc::now()).unwrap();
    assert_eq!(
        validated.project_information.unwrap().project_id,
        "285dc9ca-a25d-4f60-93be-36dc312266d7"
    );
}
