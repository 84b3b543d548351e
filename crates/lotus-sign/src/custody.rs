//! Key custody behind authorization grants
//!
//! Private keys never leave custody. Every operation takes an
//! [`AuthorizationGrant`] by value, so a grant authorizes exactly one
//! operation; the type is deliberately not `Clone`. Grants are scoped to a
//! key alias, and signing grants are additionally bound to the document
//! digest approved in the challenge.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use lotus_crypto::{hash, MlDsaKeyPair, SignatureAlgorithm};
use lotus_pki::{csr, DnSubject};
use time::OffsetDateTime;

use crate::error::{Result, SignError};

/// Proof that a signing challenge was redeemed, consumed by one custody
/// operation
#[derive(Debug)]
pub struct AuthorizationGrant {
    subject: String,
    key_alias: String,
    document_digest_b64: String,
    expires_at: OffsetDateTime,
}

impl AuthorizationGrant {
    pub(crate) fn new(
        subject: String,
        key_alias: String,
        document_digest_b64: String,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            subject,
            key_alias,
            document_digest_b64,
            expires_at,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    pub fn document_digest_b64(&self) -> &str {
        &self.document_digest_b64
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// Check alias scope and expiry; `digest` additionally checks the
    /// digest binding for signing operations
    fn ensure(&self, alias: &str, digest: Option<&str>) -> Result<()> {
        if self.key_alias != alias {
            return Err(SignError::GrantAliasMismatch);
        }
        if OffsetDateTime::now_utc() > self.expires_at {
            return Err(SignError::GrantExpired);
        }
        if let Some(digest) = digest {
            if self.document_digest_b64 != digest {
                return Err(SignError::GrantDigestMismatch);
            }
        }
        Ok(())
    }
}

/// Key store executing grant-gated operations
pub trait KeyCustody: Send + Sync {
    /// Generate a key pair under the alias; returns the public key as SPKI
    /// PEM
    fn generate_keypair(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<String>;

    /// Build a signed CSR for the key under the alias
    fn generate_csr(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        subject: &DnSubject,
    ) -> Result<String>;

    /// Sign the digest the grant was bound to; returns the signature base64
    fn sign_hash(&self, grant: AuthorizationGrant, alias: &str, digest_b64: &str)
        -> Result<String>;

    /// Public key for an alias, as SPKI PEM
    fn public_key_pem(&self, alias: &str) -> Result<String>;
}

/// In-process software custody; an HSM-backed implementation replaces this
/// in production deployments
#[derive(Default)]
pub struct SoftwareKeyCustody {
    keys: RwLock<HashMap<String, MlDsaKeyPair>>,
}

impl SoftwareKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_key<R>(&self, alias: &str, f: impl FnOnce(&MlDsaKeyPair) -> Result<R>) -> Result<R> {
        let keys = self
            .keys
            .read()
            .map_err(|_| SignError::StoreError("custody lock poisoned".to_string()))?;
        let key = keys
            .get(alias)
            .ok_or_else(|| SignError::KeyNotFound(alias.to_string()))?;
        f(key)
    }
}

impl KeyCustody for SoftwareKeyCustody {
    fn generate_keypair(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<String> {
        grant.ensure(alias, None)?;
        let keypair = MlDsaKeyPair::generate(algorithm);
        let public_pem = keypair.public_key_pem()?;

        let mut keys = self
            .keys
            .write()
            .map_err(|_| SignError::StoreError("custody lock poisoned".to_string()))?;
        keys.insert(alias.to_string(), keypair);
        Ok(public_pem)
    }

    fn generate_csr(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        subject: &DnSubject,
    ) -> Result<String> {
        grant.ensure(alias, None)?;
        self.with_key(alias, |key| Ok(csr::create_csr(key, subject)?.to_pem()?))
    }

    fn sign_hash(
        &self,
        grant: AuthorizationGrant,
        alias: &str,
        digest_b64: &str,
    ) -> Result<String> {
        grant.ensure(alias, Some(digest_b64))?;
        let digest = hash::b64_decode(digest_b64)?;
        self.with_key(alias, |key| {
            let signature = key.sign(&digest)?;
            Ok(hash::b64_encode(&signature))
        })
    }

    fn public_key_pem(&self, alias: &str) -> Result<String> {
        self.with_key(alias, |key| Ok(key.public_key_pem()?))
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn grant(alias: &str, digest: &str) -> AuthorizationGrant {
        AuthorizationGrant::new(
            "user1".to_string(),
            alias.to_string(),
            digest.to_string(),
            OffsetDateTime::now_utc() + Duration::seconds(60),
        )
    }

    #[test]
    fn test_generate_and_sign() {
        let custody = SoftwareKeyCustody::new();
        let digest_b64 = hash::b64_encode(&hash::sha256(b"document"));

        let public_pem = custody
            .generate_keypair(grant("user1_sign", ""), "user1_sign", SignatureAlgorithm::MlDsa44)
            .unwrap();
        let signature_b64 = custody
            .sign_hash(grant("user1_sign", &digest_b64), "user1_sign", &digest_b64)
            .unwrap();

        let (algorithm, public_key) =
            lotus_crypto::pem::public_key_from_pem(&public_pem).unwrap();
        let signature = hash::b64_decode(&signature_b64).unwrap();
        assert!(lotus_crypto::verify(
            algorithm,
            &public_key,
            &hash::sha256(b"document"),
            &signature
        )
        .unwrap());
    }

    #[test]
    fn test_grant_alias_scope() {
        let custody = SoftwareKeyCustody::new();
        let err = custody
            .generate_keypair(grant("other_alias", ""), "user1_sign", SignatureAlgorithm::MlDsa44)
            .unwrap_err();
        assert!(matches!(err, SignError::GrantAliasMismatch));
    }

    #[test]
    fn test_grant_digest_binding() {
        let custody = SoftwareKeyCustody::new();
        custody
            .generate_keypair(grant("a", ""), "a", SignatureAlgorithm::MlDsa44)
            .unwrap();

        let approved = hash::b64_encode(&hash::sha256(b"approved"));
        let other = hash::b64_encode(&hash::sha256(b"other"));
        let err = custody
            .sign_hash(grant("a", &approved), "a", &other)
            .unwrap_err();
        assert!(matches!(err, SignError::GrantDigestMismatch));
    }

    #[test]
    fn test_expired_grant_rejected() {
        let custody = SoftwareKeyCustody::new();
        let expired = AuthorizationGrant::new(
            "user1".to_string(),
            "a".to_string(),
            String::new(),
            OffsetDateTime::now_utc() - Duration::seconds(1),
        );
        let err = custody
            .generate_keypair(expired, "a", SignatureAlgorithm::MlDsa44)
            .unwrap_err();
        assert!(matches!(err, SignError::GrantExpired));
    }

    #[test]
    fn test_missing_key_reported_by_alias() {
        let custody = SoftwareKeyCustody::new();
        let err = custody
            .generate_csr(grant("ghost", ""), "ghost", &DnSubject::common_name("X"))
            .unwrap_err();
        assert!(matches!(err, SignError::KeyNotFound(alias) if alias == "ghost"));
    }
}
