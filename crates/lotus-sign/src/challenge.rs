//! Signing challenges
//!
//! Authorizing a remote signature is a two-step protocol: the service issues
//! a challenge bound to a subject, key alias and document digest, and the
//! user redeems it with a confirmation code. Redemption is exactly-once:
//! whichever caller removes the challenge from the store wins, everyone else
//! gets `ChallengeNotFound`. A wrong code leaves the challenge in place so
//! the user may retry until it expires.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use lotus_crypto::{hash, totp};
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{
    custody::AuthorizationGrant,
    error::{Result, SignError},
};

/// Challenge id entropy in bytes, base64url encoded
const CHALLENGE_ID_LEN: usize = 24;

/// Default challenge lifetime
const CHALLENGE_TTL: Duration = Duration::seconds(300);

/// Default grant lifetime after redemption
const GRANT_TTL: Duration = Duration::seconds(60);

/// A pending signing challenge
#[derive(Debug, Clone)]
pub struct SigningChallenge {
    pub id: String,
    pub subject: String,
    pub key_alias: String,
    pub document_digest_b64: String,
    pub digest_algorithm: String,
    /// Static confirmation code, compared only under [`CodePolicy::StaticDemo`]
    code: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Storage for pending challenges
pub trait ChallengeStore: Send + Sync {
    fn insert(&self, challenge: SigningChallenge) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<SigningChallenge>>;

    /// Remove and return a challenge; `None` when another caller got there
    /// first
    fn remove(&self, id: &str) -> Result<Option<SigningChallenge>>;

    /// Drop expired challenges, returning how many were removed
    fn purge_expired(&self, now: OffsetDateTime) -> Result<usize>;
}

/// In-memory challenge store
#[derive(Default)]
pub struct MemoryChallengeStore {
    challenges: RwLock<HashMap<String, SigningChallenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> SignError {
        SignError::StoreError("challenge store lock poisoned".to_string())
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn insert(&self, challenge: SigningChallenge) -> Result<()> {
        let mut challenges = self.challenges.write().map_err(|_| Self::lock_err())?;
        challenges.insert(challenge.id.clone(), challenge);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SigningChallenge>> {
        let challenges = self.challenges.read().map_err(|_| Self::lock_err())?;
        Ok(challenges.get(id).cloned())
    }

    fn remove(&self, id: &str) -> Result<Option<SigningChallenge>> {
        let mut challenges = self.challenges.write().map_err(|_| Self::lock_err())?;
        Ok(challenges.remove(id))
    }

    fn purge_expired(&self, now: OffsetDateTime) -> Result<usize> {
        let mut challenges = self.challenges.write().map_err(|_| Self::lock_err())?;
        let before = challenges.len();
        challenges.retain(|_, c| c.expires_at >= now);
        Ok(before - challenges.len())
    }
}

/// Source of TOTP secrets per subject
pub trait TotpEnrollment: Send + Sync {
    fn secret_for(&self, subject: &str) -> Option<String>;
}

/// In-memory TOTP directory
#[derive(Default)]
pub struct MemoryTotpDirectory {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemoryTotpDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a subject; returns the secret and its otpauth URI
    pub fn enroll(&self, subject: &str, issuer: &str) -> Result<(String, String)> {
        let secret = totp::generate_secret();
        let uri = totp::provisioning_uri(&secret, issuer, subject);
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| SignError::StoreError("totp directory lock poisoned".to_string()))?;
        secrets.insert(subject.to_string(), secret.clone());
        Ok((secret, uri))
    }
}

impl TotpEnrollment for MemoryTotpDirectory {
    fn secret_for(&self, subject: &str) -> Option<String> {
        self.secrets.read().ok()?.get(subject).cloned()
    }
}

/// How confirmation codes are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePolicy {
    /// RFC 6238 TOTP against the subject's enrolled secret
    Totp,
    /// Compare against the code generated with the challenge; the code is
    /// returned to the caller. Demo and test environments only.
    StaticDemo,
}

/// What the caller gets back from challenge creation
#[derive(Debug, Clone)]
pub struct ChallengeTicket {
    pub challenge_id: String,
    pub expires_at: OffsetDateTime,
    /// Populated only under [`CodePolicy::StaticDemo`]
    pub demo_code: Option<String>,
}

/// Issues and redeems signing challenges
pub struct ChallengeService {
    store: Arc<dyn ChallengeStore>,
    enrollment: Arc<dyn TotpEnrollment>,
    policy: CodePolicy,
    challenge_ttl: Duration,
    grant_ttl: Duration,
}

impl ChallengeService {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        enrollment: Arc<dyn TotpEnrollment>,
        policy: CodePolicy,
    ) -> Self {
        Self {
            store,
            enrollment,
            policy,
            challenge_ttl: CHALLENGE_TTL,
            grant_ttl: GRANT_TTL,
        }
    }

    /// Override lifetimes, for tests and non-default deployments
    pub fn with_ttls(mut self, challenge_ttl: Duration, grant_ttl: Duration) -> Self {
        self.challenge_ttl = challenge_ttl;
        self.grant_ttl = grant_ttl;
        self
    }

    /// Open a challenge for signing the given document digest
    pub fn create_challenge(
        &self,
        subject: &str,
        key_alias: &str,
        document_digest_b64: &str,
        digest_algorithm: &str,
    ) -> Result<ChallengeTicket> {
        let now = OffsetDateTime::now_utc();
        let challenge = SigningChallenge {
            id: new_challenge_id(),
            subject: subject.to_string(),
            key_alias: key_alias.to_string(),
            document_digest_b64: document_digest_b64.to_string(),
            digest_algorithm: digest_algorithm.to_string(),
            code: new_confirmation_code(),
            created_at: now,
            expires_at: now + self.challenge_ttl,
        };

        let ticket = ChallengeTicket {
            challenge_id: challenge.id.clone(),
            expires_at: challenge.expires_at,
            demo_code: match self.policy {
                CodePolicy::StaticDemo => Some(challenge.code.clone()),
                CodePolicy::Totp => None,
            },
        };
        self.store.insert(challenge)?;

        info!(challenge = %ticket.challenge_id, subject, key_alias, "signing challenge created");
        Ok(ticket)
    }

    /// Redeem a challenge with a confirmation code, minting a one-shot grant
    pub fn verify_challenge(&self, id: &str, code: &str) -> Result<AuthorizationGrant> {
        let challenge = self.store.get(id)?.ok_or(SignError::ChallengeNotFound)?;

        if OffsetDateTime::now_utc() > challenge.expires_at {
            self.store.remove(id)?;
            return Err(SignError::ChallengeExpired);
        }

        let code_ok = match self.policy {
            CodePolicy::StaticDemo => constant_time_eq(challenge.code.as_bytes(), code.as_bytes()),
            CodePolicy::Totp => {
                let secret = self
                    .enrollment
                    .secret_for(&challenge.subject)
                    .ok_or(SignError::TotpNotEnrolled)?;
                totp::verify(&secret, code)?
            }
        };
        if !code_ok {
            // Challenge stays; the user may retry until expiry
            return Err(SignError::InvalidCode);
        }

        // The removal is the redemption: losing the race means someone else
        // already consumed this challenge
        let challenge = self.store.remove(id)?.ok_or(SignError::ChallengeNotFound)?;

        info!(challenge = %id, subject = %challenge.subject, "signing challenge redeemed");
        Ok(AuthorizationGrant::new(
            challenge.subject,
            challenge.key_alias,
            challenge.document_digest_b64,
            OffsetDateTime::now_utc() + self.grant_ttl,
        ))
    }

    /// Withdraw a pending challenge
    pub fn cancel_challenge(&self, id: &str) -> Result<()> {
        if self.store.remove(id)?.is_none() {
            return Err(SignError::ChallengeNotFound);
        }
        info!(challenge = %id, "signing challenge cancelled");
        Ok(())
    }
}

fn new_challenge_id() -> String {
    let mut bytes = [0u8; CHALLENGE_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    hash::b64url_encode(&bytes)
}

fn new_confirmation_code() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_service() -> ChallengeService {
        ChallengeService::new(
            Arc::new(MemoryChallengeStore::new()),
            Arc::new(MemoryTotpDirectory::new()),
            CodePolicy::StaticDemo,
        )
    }

    #[test]
    fn test_redeem_with_demo_code() {
        let service = demo_service();
        let ticket = service
            .create_challenge("user1", "user1_sign", "ZGlnZXN0", "SHA-256")
            .unwrap();
        let code = ticket.demo_code.unwrap();

        let grant = service.verify_challenge(&ticket.challenge_id, &code).unwrap();
        assert_eq!(grant.subject(), "user1");
        assert_eq!(grant.key_alias(), "user1_sign");
        assert_eq!(grant.document_digest_b64(), "ZGlnZXN0");
    }

    #[test]
    fn test_wrong_code_leaves_challenge_pending() {
        let service = demo_service();
        let ticket = service
            .create_challenge("user1", "user1_sign", "ZGlnZXN0", "SHA-256")
            .unwrap();
        let code = ticket.demo_code.unwrap();

        for _ in 0..3 {
            assert!(matches!(
                service.verify_challenge(&ticket.challenge_id, "000000"),
                Err(SignError::InvalidCode)
            ));
        }
        // Still redeemable with the right code
        service.verify_challenge(&ticket.challenge_id, &code).unwrap();
    }

    #[test]
    fn test_redemption_is_single_use() {
        let service = demo_service();
        let ticket = service
            .create_challenge("user1", "user1_sign", "ZGlnZXN0", "SHA-256")
            .unwrap();
        let code = ticket.demo_code.unwrap();

        service.verify_challenge(&ticket.challenge_id, &code).unwrap();
        assert!(matches!(
            service.verify_challenge(&ticket.challenge_id, &code),
            Err(SignError::ChallengeNotFound)
        ));
    }

    #[test]
    fn test_expired_challenge_rejected_and_removed() {
        let service = demo_service().with_ttls(Duration::ZERO, GRANT_TTL);
        let ticket = service
            .create_challenge("user1", "user1_sign", "ZGlnZXN0", "SHA-256")
            .unwrap();
        let code = ticket.demo_code.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(matches!(
            service.verify_challenge(&ticket.challenge_id, &code),
            Err(SignError::ChallengeExpired)
        ));
        // Gone after the expiry rejection
        assert!(matches!(
            service.verify_challenge(&ticket.challenge_id, &code),
            Err(SignError::ChallengeNotFound)
        ));
    }

    #[test]
    fn test_totp_policy_requires_enrollment() {
        let directory = Arc::new(MemoryTotpDirectory::new());
        let service = ChallengeService::new(
            Arc::new(MemoryChallengeStore::new()),
            directory.clone(),
            CodePolicy::Totp,
        );

        let ticket = service
            .create_challenge("user1", "user1_sign", "ZGlnZXN0", "SHA-256")
            .unwrap();
        assert!(ticket.demo_code.is_none());
        assert!(matches!(
            service.verify_challenge(&ticket.challenge_id, "123456"),
            Err(SignError::TotpNotEnrolled)
        ));

        let (secret, _uri) = directory.enroll("user1", "Lotus").unwrap();
        let code = totp::current_code(&secret).unwrap();
        service.verify_challenge(&ticket.challenge_id, &code).unwrap();
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryChallengeStore::new();
        let now = OffsetDateTime::now_utc();
        store
            .insert(SigningChallenge {
                id: "stale".to_string(),
                subject: "u".to_string(),
                key_alias: "a".to_string(),
                document_digest_b64: String::new(),
                digest_algorithm: "SHA-256".to_string(),
                code: "000000".to_string(),
                created_at: now - Duration::seconds(600),
                expires_at: now - Duration::seconds(300),
            })
            .unwrap();

        assert_eq!(store.purge_expired(now).unwrap(), 1);
        assert!(store.get("stale").unwrap().is_none());
    }
}
