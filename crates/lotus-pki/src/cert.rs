//! Certificate construction and parsing
//!
//! Certificates are hand-assembled from `x509-cert` structures and signed
//! with ML-DSA: build the TBS portion, DER-encode it, sign, then attach the
//! signature. The SPKI algorithm OID of the subject key is written verbatim,
//! so parsed certificates always identify their own algorithm.

use std::time::{Duration, SystemTime};

use der::{
    asn1::{BitString, GeneralizedTime, Ia5String, OctetString},
    DateTime, Decode, Encode,
};
use lotus_crypto::{algorithm::SignatureAlgorithm, MlDsaKeyPair};
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use time::OffsetDateTime;
use x509_cert::{
    certificate::{TbsCertificate, Version},
    ext::{
        pkix::{
            crl::dp::DistributionPoint,
            name::{DistributionPointName, GeneralName},
            AccessDescription, AuthorityInfoAccessSyntax, BasicConstraints, CrlDistributionPoints,
            KeyUsage, KeyUsages,
        },
        Extension, Extensions,
    },
    name::Name,
    serial_number::SerialNumber,
    time::{Time, Validity},
    Certificate,
};

use crate::{
    dn::DnSubject,
    error::{PkiError, Result},
};

/// PEM tag for certificates
pub const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Certificate profile selecting the extension set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertProfile {
    /// CA certificate: basicConstraints CA with an optional path length,
    /// keyCertSign and cRLSign
    Ca { path_len: Option<u8> },
    /// End-entity certificate: digitalSignature and nonRepudiation
    Leaf,
}

/// Inputs for issuing a certificate from an existing CA
pub struct IssuanceParams<'a> {
    pub subject: &'a DnSubject,
    /// Subject public key in SPKI DER form
    pub subject_spki_der: &'a [u8],
    pub serial: u64,
    pub validity_days: u32,
    pub profile: CertProfile,
    /// CRL distribution point URI, when published
    pub crl_url: Option<&'a str>,
    /// Authority Information Access caIssuers URI, when published
    pub aia_url: Option<&'a str>,
}

/// Build and sign a self-signed CA certificate
pub fn build_self_signed(
    keypair: &MlDsaKeyPair,
    subject: &DnSubject,
    serial: u64,
    validity_days: u32,
) -> Result<String> {
    let name = subject.to_name()?;
    let spki_der =
        lotus_crypto::pem::public_key_to_der(keypair.algorithm(), &keypair.verifying_key_bytes())?;
    let spki = SubjectPublicKeyInfoOwned::from_der(&spki_der)?;

    let extensions = ca_extensions(None, None, None)?;
    let tbs = build_tbs(
        name.clone(),
        name,
        spki,
        serial,
        keypair.algorithm(),
        validity_days,
        extensions,
    )?;
    sign_and_encode(tbs, keypair)
}

/// Build and sign a certificate issued by an existing CA
///
/// The signature algorithm is the issuer's, taken from the issuer key; the
/// subject key may use a different (weaker) parameter set.
pub fn issue(
    issuer_cert_pem: &str,
    issuer_key: &MlDsaKeyPair,
    params: &IssuanceParams<'_>,
) -> Result<String> {
    let issuer_cert = certificate_from_pem(issuer_cert_pem)?;
    let issuer_name = issuer_cert.tbs_certificate.subject.clone();

    let subject_name = params.subject.to_name()?;
    let spki = SubjectPublicKeyInfoOwned::from_der(params.subject_spki_der)?;
    // Reject non ML-DSA subject keys up front
    SignatureAlgorithm::from_oid(spki.algorithm.oid)?;

    let extensions = match params.profile {
        CertProfile::Ca { path_len } => ca_extensions(path_len, params.crl_url, params.aia_url)?,
        CertProfile::Leaf => leaf_extensions(params.crl_url, params.aia_url)?,
    };

    let tbs = build_tbs(
        issuer_name,
        subject_name,
        spki,
        params.serial,
        issuer_key.algorithm(),
        params.validity_days,
        extensions,
    )?;
    sign_and_encode(tbs, issuer_key)
}

/// Parsed summary of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: DnSubject,
    pub issuer: DnSubject,
    pub serial: u64,
    /// Algorithm of the subject key, derived from the SPKI OID
    pub algorithm: SignatureAlgorithm,
    /// Raw verifying key bytes
    pub public_key: Vec<u8>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse a PEM certificate into its summary
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let cert = certificate_from_pem(pem_str)?;
        Self::from_certificate(&cert)
    }

    /// Extract the summary from a decoded certificate
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        let tbs = &cert.tbs_certificate;

        let spki_der = tbs.subject_public_key_info.to_der()?;
        let (algorithm, public_key) = lotus_crypto::pem::public_key_from_der(&spki_der)?;

        let is_ca = tbs
            .extensions
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter(|ext| ext.extn_id == const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS)
            .filter_map(|ext| BasicConstraints::from_der(ext.extn_value.as_bytes()).ok())
            .map(|bc| bc.ca)
            .next()
            .unwrap_or(false);

        Ok(Self {
            subject: DnSubject::from_name(&tbs.subject)?,
            issuer: DnSubject::from_name(&tbs.issuer)?,
            serial: decode_serial(&tbs.serial_number)?,
            algorithm,
            public_key,
            not_before: from_x509_time(&tbs.validity.not_before),
            not_after: from_x509_time(&tbs.validity.not_after),
            is_ca,
        })
    }

    /// Whether the certificate is within its validity window at `now`
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now >= self.not_before && now <= self.not_after
    }
}

/// Parse a PEM certificate
pub fn certificate_from_pem(pem_str: &str) -> Result<Certificate> {
    let parsed = pem::parse(pem_str)?;
    if parsed.tag() != CERTIFICATE_TAG {
        return Err(PkiError::CertError(format!(
            "Invalid PEM tag, expected {CERTIFICATE_TAG}, got {}",
            parsed.tag()
        )));
    }
    Ok(Certificate::from_der(parsed.contents())?)
}

/// Encode a certificate as PEM
pub fn certificate_to_pem(cert: &Certificate) -> Result<String> {
    let der = cert.to_der()?;
    Ok(pem::encode(&pem::Pem::new(CERTIFICATE_TAG, der)))
}

/// Verify that `cert_pem` carries a valid signature by the issuer certificate
pub fn verify_signed_by(cert_pem: &str, issuer_cert_pem: &str) -> Result<bool> {
    let cert = certificate_from_pem(cert_pem)?;
    let issuer = CertificateInfo::from_pem(issuer_cert_pem)?;

    let message = cert.tbs_certificate.to_der()?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| PkiError::CertError("Signature is not octet aligned".to_string()))?;

    // The signature algorithm must match the issuer's key algorithm
    let sig_alg = SignatureAlgorithm::from_oid(cert.signature_algorithm.oid)?;
    if sig_alg != issuer.algorithm {
        return Ok(false);
    }

    Ok(lotus_crypto::verify(
        issuer.algorithm,
        &issuer.public_key,
        &message,
        signature,
    )?)
}

fn build_tbs(
    issuer: Name,
    subject: Name,
    spki: SubjectPublicKeyInfoOwned,
    serial: u64,
    signature_algorithm: SignatureAlgorithm,
    validity_days: u32,
    extensions: Extensions,
) -> Result<TbsCertificate> {
    Ok(TbsCertificate {
        version: Version::V3,
        serial_number: encode_serial(serial)?,
        signature: AlgorithmIdentifierOwned {
            oid: signature_algorithm.oid(),
            parameters: None,
        },
        issuer,
        validity: validity_for_days(validity_days)?,
        subject,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    })
}

fn sign_and_encode(tbs: TbsCertificate, issuer_key: &MlDsaKeyPair) -> Result<String> {
    let tbs_der = tbs.to_der()?;
    let signature = issuer_key.sign(&tbs_der)?;

    let cert = Certificate {
        signature_algorithm: tbs.signature.clone(),
        tbs_certificate: tbs,
        signature: BitString::from_bytes(&signature)?,
    };
    certificate_to_pem(&cert)
}

fn ca_extensions(
    path_len: Option<u8>,
    crl_url: Option<&str>,
    aia_url: Option<&str>,
) -> Result<Extensions> {
    let mut extensions = vec![
        extension(
            const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS,
            true,
            &BasicConstraints {
                ca: true,
                path_len_constraint: path_len,
            },
        )?,
        extension(
            const_oid::db::rfc5280::ID_CE_KEY_USAGE,
            true,
            &KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign),
        )?,
    ];
    append_endpoint_extensions(&mut extensions, crl_url, aia_url)?;
    Ok(extensions)
}

fn leaf_extensions(crl_url: Option<&str>, aia_url: Option<&str>) -> Result<Extensions> {
    let mut extensions = vec![
        extension(
            const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS,
            true,
            &BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
        )?,
        extension(
            const_oid::db::rfc5280::ID_CE_KEY_USAGE,
            true,
            &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::NonRepudiation),
        )?,
    ];
    append_endpoint_extensions(&mut extensions, crl_url, aia_url)?;
    Ok(extensions)
}

fn append_endpoint_extensions(
    extensions: &mut Vec<Extension>,
    crl_url: Option<&str>,
    aia_url: Option<&str>,
) -> Result<()> {
    if let Some(url) = crl_url {
        let uri = Ia5String::new(url)
            .map_err(|e| PkiError::CertError(format!("Invalid CRL URL: {e}")))?;
        let crl_dp = CrlDistributionPoints(vec![DistributionPoint {
            distribution_point: Some(DistributionPointName::FullName(vec![
                GeneralName::UniformResourceIdentifier(uri),
            ])),
            reasons: None,
            crl_issuer: None,
        }]);
        extensions.push(extension(
            const_oid::db::rfc5280::ID_CE_CRL_DISTRIBUTION_POINTS,
            false,
            &crl_dp,
        )?);
    }

    if let Some(url) = aia_url {
        let uri = Ia5String::new(url)
            .map_err(|e| PkiError::CertError(format!("Invalid AIA URL: {e}")))?;
        let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
            access_method: const_oid::db::rfc5280::ID_AD_CA_ISSUERS,
            access_location: GeneralName::UniformResourceIdentifier(uri),
        }]);
        extensions.push(extension(
            const_oid::db::rfc5280::ID_PE_AUTHORITY_INFO_ACCESS,
            false,
            &aia,
        )?);
    }
    Ok(())
}

pub(crate) fn extension(
    oid: der::asn1::ObjectIdentifier,
    critical: bool,
    value: &impl Encode,
) -> Result<Extension> {
    Ok(Extension {
        extn_id: oid,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

fn validity_for_days(days: u32) -> Result<Validity> {
    let now = SystemTime::now();
    let not_after = now + Duration::from_secs(u64::from(days) * 86_400);
    Ok(Validity {
        not_before: to_x509_time(now)?,
        not_after: to_x509_time(not_after)?,
    })
}

pub(crate) fn to_x509_time(st: SystemTime) -> Result<Time> {
    let dt = DateTime::from_system_time(st)?;
    Ok(Time::GeneralTime(GeneralizedTime::from_date_time(dt)))
}

pub(crate) fn from_x509_time(t: &Time) -> OffsetDateTime {
    let dt = match t {
        Time::UtcTime(u) => u.to_date_time(),
        Time::GeneralTime(g) => g.to_date_time(),
    };
    OffsetDateTime::from_unix_timestamp(dt.unix_duration().as_secs() as i64)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// DER INTEGER encoding of a u64 serial (minimal, unsigned)
pub(crate) fn encode_serial(serial: u64) -> Result<SerialNumber> {
    let bytes = serial.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    let mut trimmed = bytes[first..].to_vec();
    if trimmed[0] & 0x80 != 0 {
        trimmed.insert(0, 0);
    }
    Ok(SerialNumber::new(&trimmed)?)
}

pub(crate) fn decode_serial(serial: &SerialNumber) -> Result<u64> {
    let bytes = serial.as_bytes();
    let bytes = match bytes.split_first() {
        Some((0, rest)) if !rest.is_empty() => rest,
        _ => bytes,
    };
    if bytes.len() > 8 {
        return Err(PkiError::CertError("Serial number exceeds 64 bits".to_string()));
    }
    let mut out = [0u8; 8];
    out[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ca_subject() -> DnSubject {
        DnSubject {
            common_name: "Unit Test Root".to_string(),
            organization: Some("Lotus PKI".to_string()),
            organizational_unit: None,
            country: Some("VN".to_string()),
            state: None,
            locality: None,
        }
    }

    #[test]
    fn test_self_signed_roundtrip() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let pem = build_self_signed(&key, &ca_subject(), 0x1_0000_0001, 3650).unwrap();

        let info = CertificateInfo::from_pem(&pem).unwrap();
        assert_eq!(info.subject, ca_subject());
        assert_eq!(info.issuer, ca_subject());
        assert_eq!(info.serial, 0x1_0000_0001);
        assert_eq!(info.algorithm, SignatureAlgorithm::MlDsa87);
        assert!(info.is_ca);
        assert!(info.is_valid_at(OffsetDateTime::now_utc()));

        // Self-signed: verifies against itself
        assert!(verify_signed_by(&pem, &pem).unwrap());
    }

    #[test]
    fn test_issue_subordinate_signed_with_issuer_algorithm() {
        let root_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let root_pem = build_self_signed(&root_key, &ca_subject(), 1, 3650).unwrap();

        let child_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa65);
        let child_spki = lotus_crypto::pem::public_key_to_der(
            child_key.algorithm(),
            &child_key.verifying_key_bytes(),
        )
        .unwrap();

        let child_pem = issue(
            &root_pem,
            &root_key,
            &IssuanceParams {
                subject: &DnSubject::common_name("Unit Test District"),
                subject_spki_der: &child_spki,
                serial: 2,
                validity_days: 1825,
                profile: CertProfile::Ca { path_len: Some(0) },
                crl_url: Some("http://pki.example.vn/crl/root.crl"),
                aia_url: None,
            },
        )
        .unwrap();

        let info = CertificateInfo::from_pem(&child_pem).unwrap();
        // Subject key keeps its own algorithm
        assert_eq!(info.algorithm, SignatureAlgorithm::MlDsa65);
        assert_eq!(info.issuer, ca_subject());
        assert!(info.is_ca);

        // Outer signature is the issuer's ML-DSA-87
        let cert = certificate_from_pem(&child_pem).unwrap();
        assert_eq!(
            SignatureAlgorithm::from_oid(cert.signature_algorithm.oid).unwrap(),
            SignatureAlgorithm::MlDsa87
        );
        assert!(verify_signed_by(&child_pem, &root_pem).unwrap());
    }

    #[test]
    fn test_leaf_is_not_ca() {
        let root_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let root_pem = build_self_signed(&root_key, &ca_subject(), 1, 3650).unwrap();

        let user_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let user_spki = lotus_crypto::pem::public_key_to_der(
            user_key.algorithm(),
            &user_key.verifying_key_bytes(),
        )
        .unwrap();

        let user_pem = issue(
            &root_pem,
            &root_key,
            &IssuanceParams {
                subject: &DnSubject::common_name("Test User"),
                subject_spki_der: &user_spki,
                serial: 3,
                validity_days: 365,
                profile: CertProfile::Leaf,
                crl_url: None,
                aia_url: None,
            },
        )
        .unwrap();

        let info = CertificateInfo::from_pem(&user_pem).unwrap();
        assert!(!info.is_ca);
        assert_eq!(info.algorithm, SignatureAlgorithm::MlDsa44);
    }

    #[test]
    fn test_tampered_certificate_fails_issuer_check() {
        let root_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let root_pem = build_self_signed(&root_key, &ca_subject(), 1, 3650).unwrap();

        let other_key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let other_pem = build_self_signed(&other_key, &ca_subject(), 1, 3650).unwrap();

        // Certificate signed by a different key with the same DN
        assert!(!verify_signed_by(&other_pem, &root_pem).unwrap());
    }

    #[test]
    fn test_serial_codec() {
        for serial in [1u64, 0x7f, 0x80, 0xff, 0x1_0000_0001, u64::MAX] {
            let encoded = encode_serial(serial).unwrap();
            assert_eq!(decode_serial(&encoded).unwrap(), serial);
        }
    }
}
