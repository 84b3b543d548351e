//! Remote signing with trusted timestamping
//!
//! Wraps key custody with timestamp acquisition. Timestamping degrades
//! gracefully: when the TSA cannot be reached the signature is still
//! returned, marked as degraded, so signing never depends on TSA
//! availability.

use std::sync::Arc;

use lotus_crypto::hash;
use lotus_pki::{countersign_message, TimestampAuthority, TimestampToken};
use tracing::warn;

use crate::{
    custody::{AuthorizationGrant, KeyCustody},
    error::Result,
};

/// A produced signature with its optional timestamp
#[derive(Debug, Clone)]
pub struct SignedOutcome {
    pub signature_b64: String,
    pub timestamp: Option<TimestampToken>,
    /// Set when the TSA was configured but unreachable
    pub degraded: Option<String>,
}

/// Signing facade over custody and an optional timestamp authority
pub struct RemoteSigningService {
    custody: Arc<dyn KeyCustody>,
    tsa: Option<Arc<dyn TimestampAuthority>>,
}

impl RemoteSigningService {
    pub fn new(custody: Arc<dyn KeyCustody>, tsa: Option<Arc<dyn TimestampAuthority>>) -> Self {
        Self { custody, tsa }
    }

    /// Sign the document digest the grant was bound to
    pub fn sign_document_hash(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        digest_b64: &str,
    ) -> Result<SignedOutcome> {
        let signature_b64 = self.custody.sign_hash(grant, alias, digest_b64)?;
        Ok(self.attach_timestamp(signature_b64))
    }

    /// Countersign a user signature over a document hash
    ///
    /// The officer's grant must be bound to the countersignature imprint;
    /// see [`countersign_imprint_b64`].
    pub fn countersign(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        document_hash_b64: &str,
        user_signature_b64: &str,
    ) -> Result<SignedOutcome> {
        let imprint_b64 = countersign_imprint_b64(document_hash_b64, user_signature_b64);
        let signature_b64 = self.custody.sign_hash(grant, alias, &imprint_b64)?;
        Ok(self.attach_timestamp(signature_b64))
    }

    fn attach_timestamp(&self, signature_b64: String) -> SignedOutcome {
        let Some(tsa) = &self.tsa else {
            return SignedOutcome {
                signature_b64,
                timestamp: None,
                degraded: None,
            };
        };

        let signature = match hash::b64_decode(&signature_b64) {
            Ok(bytes) => bytes,
            Err(_) => Vec::new(),
        };
        match tsa.timestamp(&signature) {
            Ok(token) => SignedOutcome {
                signature_b64,
                timestamp: Some(token),
                degraded: None,
            },
            Err(e) => {
                warn!(error = %e, "timestamp authority unavailable, returning untimestamped signature");
                SignedOutcome {
                    signature_b64,
                    timestamp: None,
                    degraded: Some("Timestamp authority unavailable".to_string()),
                }
            }
        }
    }
}

/// Base64 of the digest an officer countersignature covers, for binding the
/// officer's challenge to it
pub fn countersign_imprint_b64(document_hash_b64: &str, user_signature_b64: &str) -> String {
    hash::b64_encode(&countersign_message(document_hash_b64, user_signature_b64))
}

#[cfg(test)]
mod tests {
    use lotus_crypto::SignatureAlgorithm;
    use lotus_pki::{InProcessTimestampAuthority, PkiError};
    use time::{Duration, OffsetDateTime};

    use crate::custody::SoftwareKeyCustody;

    use super::*;

    fn grant(alias: &str, digest: &str) -> AuthorizationGrant {
        AuthorizationGrant::new(
            "user1".to_string(),
            alias.to_string(),
            digest.to_string(),
            OffsetDateTime::now_utc() + Duration::seconds(60),
        )
    }

    fn custody_with_key(alias: &str) -> Arc<SoftwareKeyCustody> {
        let custody = Arc::new(SoftwareKeyCustody::new());
        custody
            .generate_keypair(grant(alias, ""), alias, SignatureAlgorithm::MlDsa44)
            .unwrap();
        custody
    }

    #[test]
    fn test_signing_with_timestamp() {
        let custody = custody_with_key("user1_sign");
        let tsa = Arc::new(InProcessTimestampAuthority::new());
        let service = RemoteSigningService::new(custody, Some(tsa));

        let digest_b64 = hash::b64_encode(&hash::sha256(b"document"));
        let outcome = service
            .sign_document_hash(grant("user1_sign", &digest_b64), "user1_sign", &digest_b64)
            .unwrap();

        assert!(outcome.degraded.is_none());
        let token = outcome.timestamp.unwrap();
        let signature = hash::b64_decode(&outcome.signature_b64).unwrap();
        assert!(token.verify_against(&signature));
    }

    struct OfflineTsa;

    impl TimestampAuthority for OfflineTsa {
        fn timestamp(&self, _data: &[u8]) -> lotus_pki::Result<TimestampToken> {
            Err(PkiError::TimestampError("connection refused".to_string()))
        }
    }

    #[test]
    fn test_tsa_outage_degrades_gracefully() {
        let custody = custody_with_key("user1_sign");
        let service = RemoteSigningService::new(custody, Some(Arc::new(OfflineTsa)));

        let digest_b64 = hash::b64_encode(&hash::sha256(b"document"));
        let outcome = service
            .sign_document_hash(grant("user1_sign", &digest_b64), "user1_sign", &digest_b64)
            .unwrap();

        assert!(!outcome.signature_b64.is_empty());
        assert!(outcome.timestamp.is_none());
        assert!(outcome.degraded.is_some());
    }

    #[test]
    fn test_no_tsa_configured_is_not_degraded() {
        let custody = custody_with_key("user1_sign");
        let service = RemoteSigningService::new(custody, None);

        let digest_b64 = hash::b64_encode(&hash::sha256(b"document"));
        let outcome = service
            .sign_document_hash(grant("user1_sign", &digest_b64), "user1_sign", &digest_b64)
            .unwrap();
        assert!(outcome.timestamp.is_none());
        assert!(outcome.degraded.is_none());
    }

    #[test]
    fn test_countersign_binds_to_imprint() {
        let custody = custody_with_key("officer_sign");
        let service = RemoteSigningService::new(custody.clone(), None);

        let document_hash_b64 = hash::b64_encode(&hash::sha256(b"doc"));
        let user_signature_b64 = hash::b64_encode(b"user signature bytes");
        let imprint_b64 = countersign_imprint_b64(&document_hash_b64, &user_signature_b64);

        let outcome = service
            .countersign(
                grant("officer_sign", &imprint_b64),
                "officer_sign",
                &document_hash_b64,
                &user_signature_b64,
            )
            .unwrap();

        // The signature verifies over the countersignature message
        let public_pem = custody.public_key_pem("officer_sign").unwrap();
        let (algorithm, public_key) =
            lotus_crypto::pem::public_key_from_pem(&public_pem).unwrap();
        let signature = hash::b64_decode(&outcome.signature_b64).unwrap();
        assert!(lotus_crypto::verify(
            algorithm,
            &public_key,
            &countersign_message(&document_hash_b64, &user_signature_b64),
            &signature
        )
        .unwrap());

        // A grant bound to the raw document hash is refused
        let err = service
            .countersign(
                grant("officer_sign", &document_hash_b64),
                "officer_sign",
                &document_hash_b64,
                &user_signature_b64,
            )
            .unwrap_err();
        assert!(matches!(err, crate::error::SignError::GrantDigestMismatch));
    }
}
