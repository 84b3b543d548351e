//! Trusted timestamping
//!
//! A timestamp token binds a SHA-384 imprint of the signed data to a
//! generation time and serial, all covered by the authority's ML-DSA
//! signature. The [`TimestampAuthority`] trait keeps the engine independent
//! of whether tokens come from the in-process signer or a remote RFC 3161
//! service.

use std::sync::atomic::{AtomicU64, Ordering};

use lotus_crypto::{hash, MlDsaKeyPair, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{PkiError, Result};

/// A signed timestamp over a data imprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampToken {
    /// Authority signature over the token's signing input, base64
    pub token_b64: String,
    /// Generation time, RFC 3339
    pub gen_time: String,
    /// Authority-assigned token serial
    pub serial: u64,
    /// SHA-384 imprint of the timestamped data, base64
    pub imprint_b64: String,
}

impl TimestampToken {
    /// Whether this token's imprint matches the given data
    pub fn verify_against(&self, data: &[u8]) -> bool {
        self.imprint_b64 == hash::b64_encode(&hash::sha384(data))
    }

    /// The byte string the authority signed
    fn signing_input(&self) -> Vec<u8> {
        format!("{}|{}|{}", self.imprint_b64, self.serial, self.gen_time).into_bytes()
    }
}

/// Issues timestamp tokens
pub trait TimestampAuthority: Send + Sync {
    fn timestamp(&self, data: &[u8]) -> Result<TimestampToken>;
}

/// In-process timestamp authority backed by its own ML-DSA key
pub struct InProcessTimestampAuthority {
    keypair: MlDsaKeyPair,
    next_serial: AtomicU64,
}

impl InProcessTimestampAuthority {
    pub fn new() -> Self {
        Self {
            keypair: MlDsaKeyPair::generate(SignatureAlgorithm::MlDsa65),
            next_serial: AtomicU64::new(1),
        }
    }

    /// The authority's verifying key as SPKI PEM
    pub fn verifying_key_pem(&self) -> Result<String> {
        Ok(self.keypair.public_key_pem()?)
    }
}

impl Default for InProcessTimestampAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampAuthority for InProcessTimestampAuthority {
    fn timestamp(&self, data: &[u8]) -> Result<TimestampToken> {
        let gen_time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| PkiError::TimestampError(format!("Failed to format time: {e}")))?;

        let mut token = TimestampToken {
            token_b64: String::new(),
            gen_time,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            imprint_b64: hash::b64_encode(&hash::sha384(data)),
        };
        let signature = self.keypair.sign(&token.signing_input())?;
        token.token_b64 = hash::b64_encode(&signature);
        Ok(token)
    }
}

/// Verify a token's authority signature against the authority's public key
pub fn verify_token(token: &TimestampToken, authority_key_pem: &str) -> Result<bool> {
    let (algorithm, public_key) = lotus_crypto::pem::public_key_from_pem(authority_key_pem)?;
    let signature = hash::b64_decode(&token.token_b64)
        .map_err(|e| PkiError::TimestampError(format!("Malformed token: {e}")))?;
    Ok(lotus_crypto::verify(
        algorithm,
        &public_key,
        &token.signing_input(),
        &signature,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_binds_data_and_authority() {
        let tsa = InProcessTimestampAuthority::new();
        let token = tsa.timestamp(b"document hash").unwrap();

        assert!(token.verify_against(b"document hash"));
        assert!(!token.verify_against(b"different data"));

        let key_pem = tsa.verifying_key_pem().unwrap();
        assert!(verify_token(&token, &key_pem).unwrap());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let tsa = InProcessTimestampAuthority::new();
        let mut token = tsa.timestamp(b"data").unwrap();
        token.serial += 1;

        let key_pem = tsa.verifying_key_pem().unwrap();
        assert!(!verify_token(&token, &key_pem).unwrap());
    }

    #[test]
    fn test_serials_increase() {
        let tsa = InProcessTimestampAuthority::new();
        let first = tsa.timestamp(b"a").unwrap();
        let second = tsa.timestamp(b"b").unwrap();
        assert!(second.serial > first.serial);
    }
}
