//! End-to-end exercise of the national hierarchy: root, provincial and
//! district CAs, end-entity issuance, chain assembly and cascade revocation.

use std::sync::Arc;

use lotus_crypto::{MlDsaKeyPair, SignatureAlgorithm};
use lotus_pki::{
    cert, CaEngine, CaLevel, CaStatus, CertStatus, CertificateAuthority, CertificateInfo,
    DnSubject, IssueRequest, MemoryKeyVault, PkiError, Verdict, Verifier,
};

fn engine() -> CaEngine {
    CaEngine::new(Arc::new(MemoryKeyVault::new()))
}

fn full_hierarchy(
    engine: &CaEngine,
) -> (
    CertificateAuthority,
    CertificateAuthority,
    CertificateAuthority,
) {
    let root = engine.initialize_root("National Root CA").unwrap();
    let provincial = engine
        .create_subordinate(root.id, "Hanoi Provincial CA", CaLevel::Provincial)
        .unwrap();
    let district = engine
        .create_subordinate(provincial.id, "Ba Dinh District CA", CaLevel::District)
        .unwrap();
    (root, provincial, district)
}

#[test]
fn full_hierarchy_issues_verifiable_user_certificates() {
    let engine = engine();
    let (root, provincial, district) = full_hierarchy(&engine);

    let user_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
    let csr_pem = lotus_pki::csr::create_csr(
        &user_key,
        &DnSubject::parse("CN=Test User,O=Citizen,C=VN").unwrap(),
    )
    .unwrap()
    .to_pem()
    .unwrap();

    let issued = engine
        .issue_user_certificate(IssueRequest {
            username: "testuser".to_string(),
            csr_pem,
            subject: None,
            issuing_ca: None,
        })
        .unwrap();

    assert_eq!(issued.issuing_ca, district.id);
    assert_eq!(issued.subject_dn, "CN=Test User,O=Citizen,C=VN");

    // Every link of the chain verifies
    assert!(cert::verify_signed_by(&issued.certificate_pem, &district.certificate_pem).unwrap());
    assert!(cert::verify_signed_by(&district.certificate_pem, &provincial.certificate_pem).unwrap());
    assert!(cert::verify_signed_by(&provincial.certificate_pem, &root.certificate_pem).unwrap());
    assert!(cert::verify_signed_by(&root.certificate_pem, &root.certificate_pem).unwrap());

    // Algorithm floors per level
    assert_eq!(
        CertificateInfo::from_pem(&root.certificate_pem).unwrap().algorithm,
        SignatureAlgorithm::MlDsa87
    );
    assert_eq!(
        CertificateInfo::from_pem(&provincial.certificate_pem).unwrap().algorithm,
        SignatureAlgorithm::MlDsa87
    );
    assert_eq!(
        CertificateInfo::from_pem(&district.certificate_pem).unwrap().algorithm,
        SignatureAlgorithm::MlDsa65
    );

    // A document signed by the user verifies through the engine
    let message = b"land title transfer 2026/08/1234";
    let signature = user_key.sign(message).unwrap();
    let report =
        Verifier::new(&engine).verify_document(&issued.certificate_pem, message, &signature);
    assert_eq!(report.verdict, Verdict::Valid);
}

#[test]
fn chain_walk_is_leaf_first_and_ends_at_root() {
    let engine = engine();
    let (root, provincial, district) = full_hierarchy(&engine);

    let chain = engine.get_chain(district.id).unwrap();
    assert_eq!(
        chain,
        vec![
            district.certificate_pem.clone(),
            provincial.certificate_pem.clone(),
            root.certificate_pem.clone()
        ]
    );

    assert!(matches!(
        engine.get_chain(uuid::Uuid::new_v4()),
        Err(PkiError::CaNotFound(_))
    ));
}

#[test]
fn cascade_revocation_covers_subtree_and_is_idempotent() {
    let engine = engine();
    let (root, provincial, district) = full_hierarchy(&engine);

    let user_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
    let csr_pem = lotus_pki::csr::create_csr(&user_key, &DnSubject::common_name("Citizen A"))
        .unwrap()
        .to_pem()
        .unwrap();
    let issued = engine
        .issue_user_certificate(IssueRequest {
            username: "citizen_a".to_string(),
            csr_pem,
            subject: None,
            issuing_ca: Some(district.id),
        })
        .unwrap();

    let outcome = engine.revoke_ca(provincial.id, "HSM compromise").unwrap();
    assert_eq!(outcome.cas_revoked, 2);
    assert_eq!(outcome.certificates_revoked, 1);

    assert_eq!(engine.registry().get_ca(root.id).unwrap().status, CaStatus::Active);
    assert_eq!(
        engine.registry().get_ca(district.id).unwrap().revocation_reason.as_deref(),
        Some("Parent CA revoked: HSM compromise")
    );
    assert_eq!(
        engine.registry().get_certificate(issued.id).unwrap().status,
        CertStatus::Revoked
    );

    // Issuing under the revoked subtree is rejected
    assert!(matches!(
        engine.create_subordinate(provincial.id, "New District", CaLevel::District),
        Err(PkiError::ParentNotActive(_))
    ));

    // Re-running the cascade changes nothing
    let again = engine.revoke_ca(provincial.id, "again").unwrap();
    assert_eq!(again.cas_revoked, 0);
    assert_eq!(again.certificates_revoked, 0);

    // The user's signature now fails verification on revocation grounds
    let message = b"post-revocation document";
    let signature = user_key.sign(message).unwrap();
    let report =
        Verifier::new(&engine).verify_document(&issued.certificate_pem, message, &signature);
    assert_eq!(report.verdict, Verdict::Invalid);
    assert!(report.crypto_valid);
}

#[test]
fn concurrent_issuance_allocates_unique_serials() {
    let engine = Arc::new(engine());
    full_hierarchy(&engine);

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
            let csr_pem = lotus_pki::csr::create_csr(
                &key,
                &DnSubject::common_name(&format!("Citizen {i}")),
            )
            .unwrap()
            .to_pem()
            .unwrap();
            engine
                .issue_user_certificate(IssueRequest {
                    username: format!("citizen_{i}"),
                    csr_pem,
                    subject: None,
                    issuing_ca: None,
                })
                .unwrap()
                .serial
        }));
    }

    let mut serials: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    serials.sort_unstable();
    serials.dedup();
    assert_eq!(serials.len(), 8, "serials must be unique");
}

#[test]
fn crl_reflects_revocations_per_issuer() {
    let engine = engine();
    let (_root, _provincial, district) = full_hierarchy(&engine);

    let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
    let csr_pem = lotus_pki::csr::create_csr(&key, &DnSubject::common_name("Citizen B"))
        .unwrap()
        .to_pem()
        .unwrap();
    let issued = engine
        .issue_user_certificate(IssueRequest {
            username: "citizen_b".to_string(),
            csr_pem,
            subject: None,
            issuing_ca: Some(district.id),
        })
        .unwrap();
    engine.revoke_certificate(issued.id, "lost device").unwrap();

    let crl_pem = engine.generate_crl(district.id).unwrap();
    assert_eq!(
        lotus_pki::crl::revoked_serials(&crl_pem).unwrap(),
        vec![issued.serial]
    );
    assert!(lotus_pki::crl::verify_crl(&crl_pem, &district.certificate_pem).unwrap());

    // CRL numbers increase across generations
    let second = engine.generate_crl(district.id).unwrap();
    assert!(
        lotus_pki::crl::crl_number(&second).unwrap() > lotus_pki::crl::crl_number(&crl_pem).unwrap()
    );
}
