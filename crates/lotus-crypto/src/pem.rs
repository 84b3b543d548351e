//! SPKI / PKCS#8 key encoding with PEM armor
//!
//! The public-key OID written here is the source of truth for algorithm
//! identification everywhere downstream; callers never carry the algorithm
//! name alongside a key document.

use der::{asn1::BitString, Decode, Encode};
use pkcs8::{
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    AlgorithmIdentifierRef, PrivateKeyInfo,
};

use crate::{
    algorithm::SignatureAlgorithm,
    error::{Error, Result},
};

/// PEM tag for SPKI public key documents
pub const PUBLIC_KEY_TAG: &str = "PUBLIC KEY";

/// PEM tag for PKCS#8 private key documents
pub const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

/// Encode a verifying key as SPKI DER
pub fn public_key_to_der(algorithm: SignatureAlgorithm, public_key: &[u8]) -> Result<Vec<u8>> {
    if public_key.len() != algorithm.verifying_key_len() {
        return Err(Error::InvalidKeyLength {
            expected: algorithm.verifying_key_len(),
            actual: public_key.len(),
        });
    }

    let spki = SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: algorithm.oid(),
            parameters: None,
        },
        subject_public_key: BitString::from_bytes(public_key)?,
    };
    Ok(spki.to_der()?)
}

/// Encode a verifying key as an SPKI PEM document
pub fn public_key_to_pem(algorithm: SignatureAlgorithm, public_key: &[u8]) -> Result<String> {
    let der = public_key_to_der(algorithm, public_key)?;
    Ok(pem::encode(&pem::Pem::new(PUBLIC_KEY_TAG, der)))
}

/// Decode SPKI DER into the algorithm and raw verifying key bytes
pub fn public_key_from_der(der: &[u8]) -> Result<(SignatureAlgorithm, Vec<u8>)> {
    let spki = SubjectPublicKeyInfoOwned::from_der(der)?;
    let algorithm = SignatureAlgorithm::from_oid(spki.algorithm.oid)?;

    let key_bytes = spki.subject_public_key.raw_bytes();
    if key_bytes.len() != algorithm.verifying_key_len() {
        return Err(Error::InvalidKeyLength {
            expected: algorithm.verifying_key_len(),
            actual: key_bytes.len(),
        });
    }
    Ok((algorithm, key_bytes.to_vec()))
}

/// Decode an SPKI PEM document into the algorithm and raw verifying key bytes
pub fn public_key_from_pem(pem_str: &str) -> Result<(SignatureAlgorithm, Vec<u8>)> {
    let parsed = pem::parse(pem_str)?;
    if parsed.tag() != PUBLIC_KEY_TAG {
        return Err(Error::Other(format!(
            "Invalid PEM tag, expected {PUBLIC_KEY_TAG}, got {}",
            parsed.tag()
        )));
    }
    public_key_from_der(parsed.contents())
}

/// Encode a signing key as a PKCS#8 PEM document
///
/// The verifying key goes into the optional publicKey field of
/// PrivateKeyInfo so the full pair can be restored from the document alone.
pub fn private_key_to_pem(
    algorithm: SignatureAlgorithm,
    signing_key: &[u8],
    verifying_key: &[u8],
) -> Result<String> {
    if signing_key.len() != algorithm.signing_key_len() {
        return Err(Error::InvalidKeyLength {
            expected: algorithm.signing_key_len(),
            actual: signing_key.len(),
        });
    }

    let info = PrivateKeyInfo {
        algorithm: AlgorithmIdentifierRef {
            oid: algorithm.oid(),
            parameters: None,
        },
        private_key: signing_key,
        public_key: Some(verifying_key),
    };
    let der = info.to_der()?;
    Ok(pem::encode(&pem::Pem::new(PRIVATE_KEY_TAG, der)))
}

/// Decode a PKCS#8 PEM document into algorithm, signing key, and the
/// embedded verifying key when present
pub fn private_key_from_pem(
    pem_str: &str,
) -> Result<(SignatureAlgorithm, Vec<u8>, Option<Vec<u8>>)> {
    let parsed = pem::parse(pem_str)?;
    if parsed.tag() != PRIVATE_KEY_TAG {
        return Err(Error::Other(format!(
            "Invalid PEM tag, expected {PRIVATE_KEY_TAG}, got {}",
            parsed.tag()
        )));
    }

    let info = PrivateKeyInfo::try_from(parsed.contents())?;
    let algorithm = SignatureAlgorithm::from_oid(info.algorithm.oid)?;

    if info.private_key.len() != algorithm.signing_key_len() {
        return Err(Error::InvalidKeyLength {
            expected: algorithm.signing_key_len(),
            actual: info.private_key.len(),
        });
    }
    let public_key = info.public_key.map(|pk| pk.to_vec());

    Ok((algorithm, info.private_key.to_vec(), public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::MlDsaKeyPair;

    #[test]
    fn test_public_key_pem_roundtrip() {
        let kp = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa65);
        let pem_str = public_key_to_pem(kp.algorithm(), &kp.verifying_key_bytes()).unwrap();
        assert!(pem_str.contains("BEGIN PUBLIC KEY"));

        let (algorithm, key_bytes) = public_key_from_pem(&pem_str).unwrap();
        assert_eq!(algorithm, SignatureAlgorithm::MlDsa65);
        assert_eq!(key_bytes, kp.verifying_key_bytes());
    }

    #[test]
    fn test_algorithm_comes_from_spki_oid() {
        // Same key bytes, different declared algorithm: length check rejects
        let kp = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let err = public_key_to_der(SignatureAlgorithm::MlDsa87, &kp.verifying_key_bytes());
        assert!(matches!(err, Err(Error::InvalidKeyLength { .. })));
    }

    #[test]
    fn test_private_key_pem_roundtrip() {
        let kp = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let pem_str = private_key_to_pem(
            kp.algorithm(),
            &kp.signing_key_bytes(),
            &kp.verifying_key_bytes(),
        )
        .unwrap();

        let (algorithm, sk, vk) = private_key_from_pem(&pem_str).unwrap();
        assert_eq!(algorithm, SignatureAlgorithm::MlDsa44);
        assert_eq!(sk, kp.signing_key_bytes());
        assert_eq!(vk.unwrap(), kp.verifying_key_bytes());
    }

    #[test]
    fn test_wrong_pem_tag_rejected() {
        let kp = MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa44);
        let der = public_key_to_der(kp.algorithm(), &kp.verifying_key_bytes()).unwrap();
        let mislabeled = pem::encode(&pem::Pem::new("CERTIFICATE", der));
        assert!(public_key_from_pem(&mislabeled).is_err());
    }
}
