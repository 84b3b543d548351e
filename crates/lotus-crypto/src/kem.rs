//! ML-KEM-768 key encapsulation and hybrid encryption
//!
//! Hybrid scheme: ML-KEM-768 encapsulation, HKDF-SHA256 derivation of a
//! one-time 256-bit AES key from the shared secret, then AES-256-GCM with a
//! fresh random 96-bit nonce and 128-bit tag. No key is ever reused across
//! messages.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use ml_kem::{
    kem::{Decapsulate, Encapsulate},
    Encoded, EncodedSizeUser, KemCore, MlKem768,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{Error, Result},
    hash,
};

type DecapsKey = <MlKem768 as KemCore>::DecapsulationKey;
type EncapsKey = <MlKem768 as KemCore>::EncapsulationKey;

/// Encoded encapsulation (public) key length in bytes
pub const ENCAPSULATION_KEY_LEN: usize = 1184;

/// Encoded decapsulation (private) key length in bytes
pub const DECAPSULATION_KEY_LEN: usize = 2400;

/// KEM ciphertext length in bytes
pub const KEM_CIPHERTEXT_LEN: usize = 1088;

/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

const KDF_INFO: &[u8] = b"lotus:ml-kem-768:aes-256-gcm:v1";

/// An ML-KEM-768 key pair
pub struct MlKemKeyPair {
    dk: DecapsKey,
    ek: EncapsKey,
}

/// Output of a hybrid encryption: AEAD ciphertext with tag, the GCM nonce,
/// and the KEM encapsulation of the one-time key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridCiphertext {
    #[serde(with = "b64_bytes")]
    ciphertext: Vec<u8>,
    #[serde(with = "b64_bytes")]
    nonce: Vec<u8>,
    #[serde(with = "b64_bytes")]
    encapsulation: Vec<u8>,
}

impl HybridCiphertext {
    /// AEAD ciphertext including the 128-bit authentication tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// 96-bit GCM nonce
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// ML-KEM-768 encapsulation of the one-time key
    pub fn encapsulation(&self) -> &[u8] {
        &self.encapsulation
    }

    pub fn ciphertext_b64(&self) -> String {
        hash::b64_encode(&self.ciphertext)
    }

    pub fn nonce_b64(&self) -> String {
        hash::b64_encode(&self.nonce)
    }

    pub fn encapsulation_b64(&self) -> String {
        hash::b64_encode(&self.encapsulation)
    }

    /// Rebuild from base64 parts
    pub fn from_b64(ciphertext: &str, nonce: &str, encapsulation: &str) -> Result<Self> {
        Ok(Self {
            ciphertext: hash::b64_decode(ciphertext)?,
            nonce: hash::b64_decode(nonce)?,
            encapsulation: hash::b64_decode(encapsulation)?,
        })
    }
}

impl MlKemKeyPair {
    /// Generate a fresh ML-KEM-768 key pair
    pub fn generate() -> Self {
        let (dk, ek) = MlKem768::generate(&mut OsRng);
        Self { dk, ek }
    }

    /// Restore a key pair from encoded key bytes
    pub fn from_bytes(decapsulation_key: &[u8], encapsulation_key: &[u8]) -> Result<Self> {
        if decapsulation_key.len() != DECAPSULATION_KEY_LEN {
            return Err(Error::InvalidKeyLength {
                expected: DECAPSULATION_KEY_LEN,
                actual: decapsulation_key.len(),
            });
        }
        if encapsulation_key.len() != ENCAPSULATION_KEY_LEN {
            return Err(Error::InvalidKeyLength {
                expected: ENCAPSULATION_KEY_LEN,
                actual: encapsulation_key.len(),
            });
        }

        let dk_enc = Encoded::<DecapsKey>::try_from(decapsulation_key)
            .map_err(|_| Error::Other("decapsulation key decode failed".to_string()))?;
        let ek_enc = Encoded::<EncapsKey>::try_from(encapsulation_key)
            .map_err(|_| Error::Other("encapsulation key decode failed".to_string()))?;

        Ok(Self {
            dk: DecapsKey::from_bytes(&dk_enc),
            ek: EncapsKey::from_bytes(&ek_enc),
        })
    }

    /// Encoded encapsulation (public) key bytes
    pub fn encapsulation_key_bytes(&self) -> Vec<u8> {
        self.ek.as_bytes().to_vec()
    }

    /// Encoded decapsulation (private) key bytes
    pub fn decapsulation_key_bytes(&self) -> Vec<u8> {
        self.dk.as_bytes().to_vec()
    }

    /// Recover the shared secret from a KEM ciphertext
    pub fn decapsulate(&self, kem_ciphertext: &[u8]) -> Result<[u8; 32]> {
        if kem_ciphertext.len() != KEM_CIPHERTEXT_LEN {
            return Err(Error::DecryptionError(
                "KEM ciphertext has the wrong length".to_string(),
            ));
        }
        let ct = ml_kem::Ciphertext::<MlKem768>::try_from(kem_ciphertext)
            .map_err(|_| Error::DecryptionError("KEM ciphertext decode failed".to_string()))?;
        let shared = self
            .dk
            .decapsulate(&ct)
            .map_err(|_| Error::DecryptionError("ML-KEM decapsulation failed".to_string()))?;

        let mut out = [0u8; 32];
        out.copy_from_slice(&shared);
        Ok(out)
    }

    /// Decrypt a hybrid ciphertext produced by [`encrypt`]
    pub fn decrypt(&self, hybrid: &HybridCiphertext) -> Result<Vec<u8>> {
        if hybrid.nonce.len() != NONCE_LEN {
            return Err(Error::DecryptionError(
                "nonce has the wrong length".to_string(),
            ));
        }
        let shared = self.decapsulate(&hybrid.encapsulation)?;
        let key = derive_aead_key(&shared);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Nonce::from_slice(&hybrid.nonce);
        cipher
            .decrypt(nonce, hybrid.ciphertext.as_ref())
            .map_err(|_| Error::DecryptionError("AES-GCM decryption failed".to_string()))
    }
}

/// Encapsulate against an encoded encapsulation key
///
/// Returns the KEM ciphertext and the 32-byte shared secret.
pub fn encapsulate(encapsulation_key: &[u8]) -> Result<(Vec<u8>, [u8; 32])> {
    if encapsulation_key.len() != ENCAPSULATION_KEY_LEN {
        return Err(Error::InvalidKeyLength {
            expected: ENCAPSULATION_KEY_LEN,
            actual: encapsulation_key.len(),
        });
    }
    let ek_enc = Encoded::<EncapsKey>::try_from(encapsulation_key)
        .map_err(|_| Error::Other("encapsulation key decode failed".to_string()))?;
    let ek = EncapsKey::from_bytes(&ek_enc);

    let (ct, shared) = ek
        .encapsulate(&mut OsRng)
        .map_err(|_| Error::EncryptionError("ML-KEM encapsulation failed".to_string()))?;

    let mut out = [0u8; 32];
    out.copy_from_slice(&shared);
    Ok((ct.to_vec(), out))
}

/// Hybrid-encrypt a message to the holder of the encapsulation key
pub fn encrypt(encapsulation_key: &[u8], plaintext: &[u8]) -> Result<HybridCiphertext> {
    let (encapsulation, shared) = encapsulate(encapsulation_key)?;
    let key = derive_aead_key(&shared);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| Error::EncryptionError("AES-GCM encryption failed".to_string()))?;

    Ok(HybridCiphertext {
        ciphertext,
        nonce: nonce.to_vec(),
        encapsulation,
    })
}

/// Derive the one-time 256-bit AEAD key from a KEM shared secret
fn derive_aead_key(shared: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut okm = [0u8; 32];
    hk.expand(KDF_INFO, &mut okm).expect("hkdf expand");
    okm
}

mod b64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::hash;

    pub fn serialize<S: Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash::b64_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hash::b64_decode(&encoded).map_err(serde::de::Error::custom)
    }
}
