//! Certificate revocation lists
//!
//! CRLs are assembled the same way certificates are: build the
//! `TbsCertList`, DER-encode, sign with the issuing CA's ML-DSA key, attach
//! the signature. Each CRL carries a monotonically increasing cRLNumber
//! extension so relying parties can detect replays of stale lists.

use std::time::{Duration, SystemTime};

use der::{asn1::BitString, Decode, Encode};
use lotus_crypto::SignatureAlgorithm;
use pkcs8::spki::AlgorithmIdentifierOwned;
use time::OffsetDateTime;
use x509_cert::{
    certificate::Version,
    crl::{CertificateList, RevokedCert, TbsCertList},
    time::Time,
};

use crate::{
    cert::{self, CertificateInfo},
    error::{PkiError, Result},
};

/// PEM tag for CRL documents
pub const CRL_TAG: &str = "X509 CRL";

/// Days until the next scheduled CRL publication
const NEXT_UPDATE_DAYS: u64 = 7;

/// One revoked certificate entry
#[derive(Debug, Clone, Copy)]
pub struct CrlEntry {
    pub serial: u64,
    pub revoked_at: OffsetDateTime,
}

/// Build and sign a CRL, returning it PEM encoded
pub fn build_crl(
    issuer_cert_pem: &str,
    issuer_key: &lotus_crypto::MlDsaKeyPair,
    entries: &[CrlEntry],
    crl_number: u64,
) -> Result<String> {
    let issuer_cert = cert::certificate_from_pem(issuer_cert_pem)?;
    let issuer_name = issuer_cert.tbs_certificate.subject.clone();

    let now = SystemTime::now();
    let next_update = now + Duration::from_secs(NEXT_UPDATE_DAYS * 86_400);

    let revoked = entries
        .iter()
        .map(|entry| -> Result<RevokedCert> {
            Ok(RevokedCert {
                serial_number: cert::encode_serial(entry.serial)?,
                revocation_date: to_crl_time(entry.revoked_at)?,
                crl_entry_extensions: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let tbs = TbsCertList {
        version: Version::V2,
        signature: AlgorithmIdentifierOwned {
            oid: issuer_key.algorithm().oid(),
            parameters: None,
        },
        issuer: issuer_name,
        this_update: cert::to_x509_time(now)?,
        next_update: Some(cert::to_x509_time(next_update)?),
        revoked_certificates: if revoked.is_empty() {
            None
        } else {
            Some(revoked)
        },
        crl_extensions: Some(vec![cert::extension(
            const_oid::db::rfc5280::ID_CE_CRL_NUMBER,
            false,
            &crl_number,
        )?]),
    };

    let tbs_der = tbs.to_der()?;
    let signature = issuer_key.sign(&tbs_der)?;
    let crl = CertificateList {
        signature_algorithm: tbs.signature.clone(),
        tbs_cert_list: tbs,
        signature: BitString::from_bytes(&signature)?,
    };

    Ok(pem::encode(&pem::Pem::new(CRL_TAG, crl.to_der()?)))
}

/// Parse a PEM CRL
pub fn crl_from_pem(pem_str: &str) -> Result<CertificateList> {
    let parsed = pem::parse(pem_str)?;
    if parsed.tag() != CRL_TAG {
        return Err(PkiError::CrlError(format!(
            "Invalid PEM tag, expected {CRL_TAG}, got {}",
            parsed.tag()
        )));
    }
    Ok(CertificateList::from_der(parsed.contents())?)
}

/// Serials listed as revoked, in the order they appear
pub fn revoked_serials(crl_pem: &str) -> Result<Vec<u64>> {
    let crl = crl_from_pem(crl_pem)?;
    crl.tbs_cert_list
        .revoked_certificates
        .unwrap_or_default()
        .iter()
        .map(|entry| cert::decode_serial(&entry.serial_number))
        .collect()
}

/// The cRLNumber carried in the CRL, when present
pub fn crl_number(crl_pem: &str) -> Result<Option<u64>> {
    let crl = crl_from_pem(crl_pem)?;
    let Some(extensions) = crl.tbs_cert_list.crl_extensions else {
        return Ok(None);
    };
    for ext in extensions {
        if ext.extn_id == const_oid::db::rfc5280::ID_CE_CRL_NUMBER {
            let number = u64::from_der(ext.extn_value.as_bytes())
                .map_err(|e| PkiError::CrlError(format!("Malformed cRLNumber: {e}")))?;
            return Ok(Some(number));
        }
    }
    Ok(None)
}

/// Verify a CRL's signature against its issuing CA certificate
pub fn verify_crl(crl_pem: &str, issuer_cert_pem: &str) -> Result<bool> {
    let crl = crl_from_pem(crl_pem)?;
    let issuer = CertificateInfo::from_pem(issuer_cert_pem)?;

    let sig_alg = SignatureAlgorithm::from_oid(crl.signature_algorithm.oid)?;
    if sig_alg != issuer.algorithm {
        return Ok(false);
    }

    let message = crl.tbs_cert_list.to_der()?;
    let signature = crl
        .signature
        .as_bytes()
        .ok_or_else(|| PkiError::CrlError("Signature is not octet aligned".to_string()))?;

    Ok(lotus_crypto::verify(
        issuer.algorithm,
        &issuer.public_key,
        &message,
        signature,
    )?)
}

fn to_crl_time(at: OffsetDateTime) -> Result<Time> {
    let st = SystemTime::UNIX_EPOCH
        + Duration::from_secs(at.unix_timestamp().max(0) as u64);
    cert::to_x509_time(st)
}

#[cfg(test)]
mod tests {
    use lotus_crypto::MlDsaKeyPair;

    use crate::dn::DnSubject;

    use super::*;

    fn issuer() -> (MlDsaKeyPair, String) {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa87);
        let pem =
            cert::build_self_signed(&key, &DnSubject::common_name("CRL Test Root"), 1, 3650)
                .unwrap();
        (key, pem)
    }

    #[test]
    fn test_empty_crl() {
        let (key, cert_pem) = issuer();
        let crl_pem = build_crl(&cert_pem, &key, &[], 1).unwrap();

        assert!(revoked_serials(&crl_pem).unwrap().is_empty());
        assert_eq!(crl_number(&crl_pem).unwrap(), Some(1));
        assert!(verify_crl(&crl_pem, &cert_pem).unwrap());
    }

    #[test]
    fn test_crl_lists_entries() {
        let (key, cert_pem) = issuer();
        let entries = [
            CrlEntry {
                serial: 0x1_0000_0001,
                revoked_at: OffsetDateTime::now_utc(),
            },
            CrlEntry {
                serial: 0x1_0000_0005,
                revoked_at: OffsetDateTime::now_utc(),
            },
        ];
        let crl_pem = build_crl(&cert_pem, &key, &entries, 7).unwrap();

        assert_eq!(
            revoked_serials(&crl_pem).unwrap(),
            vec![0x1_0000_0001, 0x1_0000_0005]
        );
        assert_eq!(crl_number(&crl_pem).unwrap(), Some(7));
    }

    #[test]
    fn test_crl_signed_by_wrong_key_rejected() {
        let (key, cert_pem) = issuer();
        let (_, other_cert) = issuer();
        let crl_pem = build_crl(&cert_pem, &key, &[], 1).unwrap();

        assert!(!verify_crl(&crl_pem, &other_cert).unwrap());
    }
}
