//! ML-DSA key generation, signing and verification
//!
//! Wraps the three FIPS 204 parameter sets behind a single key pair type so
//! callers never handle the parameter-set generics directly.

use ml_dsa::{
    EncodedSignature, EncodedSigningKey, EncodedVerifyingKey, KeyGen, MlDsa44, MlDsa65, MlDsa87,
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;
use signature::{Signer, Verifier};

use crate::{
    algorithm::SignatureAlgorithm,
    error::{Error, Result},
    pem,
};

enum Keys {
    MlDsa44 {
        sk: SigningKey<MlDsa44>,
        vk: VerifyingKey<MlDsa44>,
    },
    MlDsa65 {
        sk: SigningKey<MlDsa65>,
        vk: VerifyingKey<MlDsa65>,
    },
    MlDsa87 {
        sk: SigningKey<MlDsa87>,
        vk: VerifyingKey<MlDsa87>,
    },
}

/// An ML-DSA signing key pair
///
/// The expanded key material is large, so it lives behind a box and the
/// pair itself moves as a pointer.
pub struct MlDsaKeyPair {
    keys: Box<Keys>,
}

impl MlDsaKeyPair {
    /// Generate a fresh key pair for the given algorithm
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        let mut rng = OsRng;
        let keys = match algorithm {
            SignatureAlgorithm::MlDsa44 => {
                let kp = MlDsa44::key_gen(&mut rng);
                Keys::MlDsa44 {
                    sk: kp.signing_key().clone(),
                    vk: kp.verifying_key().clone(),
                }
            }
            SignatureAlgorithm::MlDsa65 => {
                let kp = MlDsa65::key_gen(&mut rng);
                Keys::MlDsa65 {
                    sk: kp.signing_key().clone(),
                    vk: kp.verifying_key().clone(),
                }
            }
            SignatureAlgorithm::MlDsa87 => {
                let kp = MlDsa87::key_gen(&mut rng);
                Keys::MlDsa87 {
                    sk: kp.signing_key().clone(),
                    vk: kp.verifying_key().clone(),
                }
            }
        };
        Self {
            keys: Box::new(keys),
        }
    }

    /// Restore a key pair from encoded signing and verifying key bytes
    pub fn from_bytes(
        algorithm: SignatureAlgorithm,
        signing_key: &[u8],
        verifying_key: &[u8],
    ) -> Result<Self> {
        if signing_key.len() != algorithm.signing_key_len() {
            return Err(Error::InvalidKeyLength {
                expected: algorithm.signing_key_len(),
                actual: signing_key.len(),
            });
        }
        if verifying_key.len() != algorithm.verifying_key_len() {
            return Err(Error::InvalidKeyLength {
                expected: algorithm.verifying_key_len(),
                actual: verifying_key.len(),
            });
        }

        let keys = match algorithm {
            SignatureAlgorithm::MlDsa44 => {
                let sk_enc = EncodedSigningKey::<MlDsa44>::try_from(signing_key)
                    .map_err(|_| Error::Other("signing key decode failed".to_string()))?;
                let vk_enc = EncodedVerifyingKey::<MlDsa44>::try_from(verifying_key)
                    .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
                Keys::MlDsa44 {
                    sk: SigningKey::decode(&sk_enc),
                    vk: VerifyingKey::decode(&vk_enc),
                }
            }
            SignatureAlgorithm::MlDsa65 => {
                let sk_enc = EncodedSigningKey::<MlDsa65>::try_from(signing_key)
                    .map_err(|_| Error::Other("signing key decode failed".to_string()))?;
                let vk_enc = EncodedVerifyingKey::<MlDsa65>::try_from(verifying_key)
                    .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
                Keys::MlDsa65 {
                    sk: SigningKey::decode(&sk_enc),
                    vk: VerifyingKey::decode(&vk_enc),
                }
            }
            SignatureAlgorithm::MlDsa87 => {
                let sk_enc = EncodedSigningKey::<MlDsa87>::try_from(signing_key)
                    .map_err(|_| Error::Other("signing key decode failed".to_string()))?;
                let vk_enc = EncodedVerifyingKey::<MlDsa87>::try_from(verifying_key)
                    .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
                Keys::MlDsa87 {
                    sk: SigningKey::decode(&sk_enc),
                    vk: VerifyingKey::decode(&vk_enc),
                }
            }
        };
        Ok(Self {
            keys: Box::new(keys),
        })
    }

    /// Algorithm of this key pair
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match &*self.keys {
            Keys::MlDsa44 { .. } => SignatureAlgorithm::MlDsa44,
            Keys::MlDsa65 { .. } => SignatureAlgorithm::MlDsa65,
            Keys::MlDsa87 { .. } => SignatureAlgorithm::MlDsa87,
        }
    }

    /// Sign a message, returning the encoded signature bytes
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = match &*self.keys {
            Keys::MlDsa44 { sk, .. } => sk
                .try_sign(message)
                .map_err(|e| Error::SigningError(e.to_string()))?
                .encode()
                .to_vec(),
            Keys::MlDsa65 { sk, .. } => sk
                .try_sign(message)
                .map_err(|e| Error::SigningError(e.to_string()))?
                .encode()
                .to_vec(),
            Keys::MlDsa87 { sk, .. } => sk
                .try_sign(message)
                .map_err(|e| Error::SigningError(e.to_string()))?
                .encode()
                .to_vec(),
        };
        Ok(signature)
    }

    /// Verify a signature made by this key pair
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        verify(
            self.algorithm(),
            &self.verifying_key_bytes(),
            message,
            signature,
        )
    }

    /// Encoded verifying key bytes
    pub fn verifying_key_bytes(&self) -> Vec<u8> {
        match &*self.keys {
            Keys::MlDsa44 { vk, .. } => vk.encode().to_vec(),
            Keys::MlDsa65 { vk, .. } => vk.encode().to_vec(),
            Keys::MlDsa87 { vk, .. } => vk.encode().to_vec(),
        }
    }

    /// Encoded signing key bytes
    pub fn signing_key_bytes(&self) -> Vec<u8> {
        match &*self.keys {
            Keys::MlDsa44 { sk, .. } => sk.encode().to_vec(),
            Keys::MlDsa65 { sk, .. } => sk.encode().to_vec(),
            Keys::MlDsa87 { sk, .. } => sk.encode().to_vec(),
        }
    }

    /// Export the public key as an SPKI PEM document
    pub fn public_key_pem(&self) -> Result<String> {
        pem::public_key_to_pem(self.algorithm(), &self.verifying_key_bytes())
    }

    /// Export the key pair as a PKCS#8 PEM document
    ///
    /// The verifying key is embedded in the optional publicKey field so the
    /// pair can be restored without re-deriving it.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        pem::private_key_to_pem(
            self.algorithm(),
            &self.signing_key_bytes(),
            &self.verifying_key_bytes(),
        )
    }

    /// Restore a key pair from a PKCS#8 PEM document
    pub fn from_pkcs8_pem(pem_str: &str) -> Result<Self> {
        let (algorithm, signing_key, verifying_key) = pem::private_key_from_pem(pem_str)?;
        let verifying_key = verifying_key.ok_or_else(|| {
            Error::Other("PKCS#8 document is missing the embedded public key".to_string())
        })?;
        Self::from_bytes(algorithm, &signing_key, &verifying_key)
    }
}

/// Verify an ML-DSA signature against encoded verifying key bytes
///
/// Returns `Ok(false)` on a signature that simply does not match; errors are
/// reserved for malformed key or signature input.
pub fn verify(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<bool> {
    if public_key.len() != algorithm.verifying_key_len() {
        return Err(Error::InvalidKeyLength {
            expected: algorithm.verifying_key_len(),
            actual: public_key.len(),
        });
    }
    if signature.len() != algorithm.signature_len() {
        return Err(Error::InvalidSignatureLength {
            expected: algorithm.signature_len(),
            actual: signature.len(),
        });
    }

    match algorithm {
        SignatureAlgorithm::MlDsa44 => {
            let vk_enc = EncodedVerifyingKey::<MlDsa44>::try_from(public_key)
                .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
            let sig_enc = EncodedSignature::<MlDsa44>::try_from(signature)
                .map_err(|_| Error::MalformedSignature)?;
            let sig = Signature::<MlDsa44>::decode(&sig_enc).ok_or(Error::MalformedSignature)?;
            let vk = VerifyingKey::<MlDsa44>::decode(&vk_enc);
            Ok(vk.verify(message, &sig).is_ok())
        }
        SignatureAlgorithm::MlDsa65 => {
            let vk_enc = EncodedVerifyingKey::<MlDsa65>::try_from(public_key)
                .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
            let sig_enc = EncodedSignature::<MlDsa65>::try_from(signature)
                .map_err(|_| Error::MalformedSignature)?;
            let sig = Signature::<MlDsa65>::decode(&sig_enc).ok_or(Error::MalformedSignature)?;
            let vk = VerifyingKey::<MlDsa65>::decode(&vk_enc);
            Ok(vk.verify(message, &sig).is_ok())
        }
        SignatureAlgorithm::MlDsa87 => {
            let vk_enc = EncodedVerifyingKey::<MlDsa87>::try_from(public_key)
                .map_err(|_| Error::Other("verifying key decode failed".to_string()))?;
            let sig_enc = EncodedSignature::<MlDsa87>::try_from(signature)
                .map_err(|_| Error::MalformedSignature)?;
            let sig = Signature::<MlDsa87>::decode(&sig_enc).ok_or(Error::MalformedSignature)?;
            let vk = VerifyingKey::<MlDsa87>::decode(&vk_enc);
            Ok(vk.verify(message, &sig).is_ok())
        }
    }
}
