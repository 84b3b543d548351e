//! Certificate Signing Request handling
//!
//! CSRs are built the same way certificates are: assemble the unsigned
//! `CertReqInfo`, DER-encode, sign with ML-DSA, attach the signature. Parsing
//! verifies the self-signature against the embedded public key, whose SPKI
//! OID determines the algorithm.

use der::{asn1::BitString, Decode, Encode};
use lotus_crypto::{algorithm::SignatureAlgorithm, MlDsaKeyPair};
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::request::{CertReq, CertReqInfo};

use crate::{
    dn::DnSubject,
    error::{PkiError, Result},
};

/// PEM tags accepted for CSR documents
const CSR_TAGS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// A certificate signing request
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

/// Build an unsigned CertReqInfo from subject and SPKI DER
pub fn build_unsigned(subject: &DnSubject, spki_der: &[u8]) -> Result<CertReqInfo> {
    let subject_dn = subject.to_name()?;

    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| PkiError::CsrError(format!("Failed to parse SPKI: {e}")))?;
    // Only ML-DSA subject keys are accepted
    SignatureAlgorithm::from_oid(spki.algorithm.oid)?;

    Ok(CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: subject_dn,
        public_key: spki,
        attributes: Default::default(),
    })
}

/// Create a signed CSR from a key pair and subject
pub fn create_csr(keypair: &MlDsaKeyPair, subject: &DnSubject) -> Result<Csr> {
    let spki_der =
        lotus_crypto::pem::public_key_to_der(keypair.algorithm(), &keypair.verifying_key_bytes())?;
    let info = build_unsigned(subject, &spki_der)?;

    let info_der = info
        .to_der()
        .map_err(|e| PkiError::CsrError(format!("Failed to encode CertReqInfo: {e}")))?;
    let signature = keypair.sign(&info_der)?;

    Csr::assemble(info, keypair.algorithm(), &signature)
}

impl Csr {
    /// Assemble a complete CSR from CertReqInfo and signature bytes
    pub fn assemble(
        info: CertReqInfo,
        algorithm: SignatureAlgorithm,
        signature: &[u8],
    ) -> Result<Self> {
        if signature.len() != algorithm.signature_len() {
            return Err(PkiError::CsrError(format!(
                "Expected {}-byte signature, got {} bytes",
                algorithm.signature_len(),
                signature.len()
            )));
        }

        let inner = CertReq {
            info,
            algorithm: AlgorithmIdentifierOwned {
                oid: algorithm.oid(),
                parameters: None,
            },
            signature: BitString::from_bytes(signature)
                .map_err(|e| PkiError::CsrError(format!("Failed to attach signature: {e}")))?,
        };
        Ok(Self { inner })
    }

    /// Parse a CSR from PEM
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let parsed = pem::parse(pem_str)
            .map_err(|e| PkiError::CsrError(format!("Failed to parse PEM: {e}")))?;
        if !CSR_TAGS.contains(&parsed.tag()) {
            return Err(PkiError::CsrError(
                "Invalid PEM tag, expected CERTIFICATE REQUEST".to_string(),
            ));
        }
        Self::from_der(parsed.contents())
    }

    /// Parse a CSR from DER
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| PkiError::CsrError(format!("Failed to parse DER: {e}")))?;
        Ok(Self { inner })
    }

    /// Export to PEM
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem::encode(&pem::Pem::new(CSR_TAGS[0], self.to_der()?)))
    }

    /// Export to DER
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("Failed to encode DER: {e}")))
    }

    /// Subject carried in the request
    pub fn subject(&self) -> Result<DnSubject> {
        DnSubject::from_name(&self.inner.info.subject)
    }

    /// Algorithm of the embedded public key, from its SPKI OID
    pub fn algorithm(&self) -> Result<SignatureAlgorithm> {
        Ok(SignatureAlgorithm::from_oid(
            self.inner.info.public_key.algorithm.oid,
        )?)
    }

    /// Raw verifying key bytes from the embedded SPKI
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        let spki_der = self.spki_der()?;
        let (_, key) = lotus_crypto::pem::public_key_from_der(&spki_der)?;
        Ok(key)
    }

    /// Embedded SPKI in DER form
    pub fn spki_der(&self) -> Result<Vec<u8>> {
        self.inner
            .info
            .public_key
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("Failed to encode SPKI: {e}")))
    }

    /// Verify the request's self-signature
    ///
    /// The declared signature algorithm must match the embedded key's SPKI
    /// OID; the signature is then checked with that key.
    pub fn verify_signature(&self) -> Result<()> {
        let algorithm = self.algorithm()?;
        if self.inner.algorithm.oid != algorithm.oid() {
            return Err(PkiError::CsrError(
                "Signature algorithm does not match the embedded key".to_string(),
            ));
        }

        let info_der = self
            .inner
            .info
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("Failed to encode info: {e}")))?;
        let signature = self.inner.signature.raw_bytes();
        let public_key = self.public_key_bytes()?;

        match lotus_crypto::verify(algorithm, &public_key, &info_der, signature) {
            Ok(true) => Ok(()),
            _ => Err(PkiError::CsrError(
                "Signature verification failed".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> DnSubject {
        DnSubject {
            common_name: "Test User".to_string(),
            organization: Some("Citizen".to_string()),
            organizational_unit: None,
            country: Some("VN".to_string()),
            state: None,
            locality: None,
        }
    }

    #[test]
    fn test_csr_creation_and_subject() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let csr = create_csr(&key, &subject()).unwrap();

        assert_eq!(csr.subject().unwrap(), subject());
        assert_eq!(csr.algorithm().unwrap(), SignatureAlgorithm::MlDsa44);
        assert_eq!(csr.public_key_bytes().unwrap(), key.verifying_key_bytes());
        csr.verify_signature().unwrap();
    }

    #[test]
    fn test_csr_pem_roundtrip() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa65);
        let original = create_csr(&key, &subject()).unwrap();

        let pem_str = original.to_pem().unwrap();
        let parsed = Csr::from_pem(&pem_str).unwrap();
        assert_eq!(parsed.to_der().unwrap(), original.to_der().unwrap());
        parsed.verify_signature().unwrap();
    }

    #[test]
    fn test_invalid_pem_tag_rejected() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let der = create_csr(&key, &subject()).unwrap().to_der().unwrap();

        let ok = pem::encode(&pem::Pem::new("NEW CERTIFICATE REQUEST", der.clone()));
        assert!(Csr::from_pem(&ok).is_ok());

        let bad = pem::encode(&pem::Pem::new("CERTIFICATE", der));
        assert!(Csr::from_pem(&bad).is_err());
    }

    #[test]
    fn test_tampered_subject_fails_verification() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let csr = create_csr(&key, &subject()).unwrap();

        // Rebuild the info with a different subject but keep the old signature
        let spki_der = csr.spki_der().unwrap();
        let forged_info =
            build_unsigned(&DnSubject::common_name("Mallory"), &spki_der).unwrap();
        let forged = Csr::assemble(
            forged_info,
            SignatureAlgorithm::MlDsa44,
            csr.inner.signature.raw_bytes(),
        )
        .unwrap();

        assert!(forged.verify_signature().is_err());
    }

    #[test]
    fn test_empty_cn_rejected() {
        let key = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        assert!(create_csr(&key, &DnSubject::common_name("")).is_err());
    }
}
