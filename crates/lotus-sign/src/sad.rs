//! Signature activation data
//!
//! The SAD is an HS256 JWT asserting that a subject's identity was verified
//! and that it may drive signing operations. Validation checks expiry, the
//! `identity_status` claim and that the requested key alias belongs to the
//! token's subject: an alias is owned when it equals the subject or starts
//! with `<subject>_`.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{Result, SignError};

/// The identity_status value accepted for signing
const VERIFIED: &str = "VERIFIED";

/// Claims carried by a SAD token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SadClaims {
    /// Authenticated subject
    pub sub: String,
    /// Expiry, seconds since the epoch
    pub exp: u64,
    /// Outcome of identity proofing
    pub identity_status: String,
}

/// Validates SAD tokens against a shared HMAC secret
pub struct SadValidator {
    secret: Vec<u8>,
}

impl SadValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Validate a bearer token and the subject's claim to `key_alias`
    pub fn validate(&self, bearer: &str, key_alias: &str) -> Result<SadClaims> {
        let token = bearer.strip_prefix("Bearer ").unwrap_or(bearer);

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<SadClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )?;
        let claims = data.claims;

        if claims.identity_status != VERIFIED {
            return Err(SignError::IdentityNotVerified);
        }
        if !alias_owned_by(key_alias, &claims.sub) {
            return Err(SignError::AliasNotOwned);
        }
        Ok(claims)
    }

    /// Mint a SAD token; the identity proofing service does this after a
    /// successful verification
    pub fn issue(&self, subject: &str, identity_status: &str, ttl: Duration) -> Result<String> {
        let claims = SadClaims {
            sub: subject.to_string(),
            exp: (OffsetDateTime::now_utc() + ttl).unix_timestamp().max(0) as u64,
            identity_status: identity_status.to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }
}

/// Alias ownership rule: the alias is the subject itself or a
/// subject-prefixed name such as `user1_sign`
fn alias_owned_by(alias: &str, subject: &str) -> bool {
    alias == subject || alias.starts_with(&format!("{subject}_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SadValidator {
        SadValidator::new(b"unit-test-shared-secret")
    }

    #[test]
    fn test_valid_token_and_owned_alias() {
        let v = validator();
        let token = v.issue("user1", VERIFIED, Duration::minutes(5)).unwrap();

        let claims = v.validate(&token, "user1_sign").unwrap();
        assert_eq!(claims.sub, "user1");

        // Bearer prefix is accepted
        v.validate(&format!("Bearer {token}"), "user1").unwrap();
    }

    #[test]
    fn test_unverified_identity_rejected() {
        let v = validator();
        let token = v.issue("user1", "PENDING", Duration::minutes(5)).unwrap();
        assert!(matches!(
            v.validate(&token, "user1_sign"),
            Err(SignError::IdentityNotVerified)
        ));
    }

    #[test]
    fn test_foreign_alias_rejected() {
        let v = validator();
        let token = v.issue("user1", VERIFIED, Duration::minutes(5)).unwrap();
        assert!(matches!(
            v.validate(&token, "user2_sign"),
            Err(SignError::AliasNotOwned)
        ));
        // Prefix matching must not accept bare prefixes of other names
        assert!(matches!(
            v.validate(&token, "user10_sign"),
            Err(SignError::AliasNotOwned)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let v = validator();
        let token = v
            .issue("user1", VERIFIED, Duration::seconds(-120))
            .unwrap();
        assert!(matches!(
            v.validate(&token, "user1"),
            Err(SignError::JwtError(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = validator()
            .issue("user1", VERIFIED, Duration::minutes(5))
            .unwrap();
        let other = SadValidator::new(b"different-secret");
        assert!(matches!(
            other.validate(&token, "user1"),
            Err(SignError::JwtError(_))
        ));
    }
}
