//! Document signature verification
//!
//! Every verification runs four independent checks and reports all of them:
//! cryptographic validity, temporal validity, revocation status and
//! structural validity. A failure in one check never short-circuits the
//! others, so a caller always sees the complete picture. Revocation lookups
//! that fail degrade the verdict to `ValidWithCaveat` instead of blocking
//! verification.

use lotus_crypto::hash;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    ca::{engine::CaEngine, types::CertStatus},
    cert::CertificateInfo,
    error::Result,
    tsa::TimestampToken,
};

/// Overall outcome of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    ValidWithCaveat,
    Invalid,
}

/// Answer from a revocation source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationCheck {
    Good,
    Revoked { reason: Option<String> },
}

/// Source of revocation answers, keyed by certificate serial
pub trait RevocationStatus: Send + Sync {
    fn check(&self, serial: u64) -> Result<RevocationCheck>;
}

impl RevocationStatus for CaEngine {
    fn check(&self, serial: u64) -> Result<RevocationCheck> {
        let info = self.revocation_status(serial)?;
        Ok(match info.status {
            CertStatus::Revoked => RevocationCheck::Revoked {
                reason: info.reason,
            },
            CertStatus::Active | CertStatus::Expired => RevocationCheck::Good,
        })
    }
}

/// Revocation as seen by the verification pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status", content = "reason")]
pub enum RevocationOutcome {
    Good,
    Revoked(Option<String>),
    /// The revocation source could not answer
    Unknown,
}

/// Full result of verifying one signature
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub crypto_valid: bool,
    pub temporally_valid: bool,
    pub revocation: RevocationOutcome,
    pub structurally_valid: bool,
    pub caveats: Vec<String>,
    pub verdict: Verdict,
}

impl VerificationReport {
    fn failed(caveat: String) -> Self {
        Self {
            crypto_valid: false,
            temporally_valid: false,
            revocation: RevocationOutcome::Unknown,
            structurally_valid: false,
            caveats: vec![caveat],
            verdict: Verdict::Invalid,
        }
    }
}

/// Verifier over a revocation source
pub struct Verifier<'a> {
    revocation: &'a dyn RevocationStatus,
}

impl<'a> Verifier<'a> {
    pub fn new(revocation: &'a dyn RevocationStatus) -> Self {
        Self { revocation }
    }

    /// Verify a detached signature over `message` with the signer's
    /// certificate
    pub fn verify_document(
        &self,
        cert_pem: &str,
        message: &[u8],
        signature: &[u8],
    ) -> VerificationReport {
        let info = match CertificateInfo::from_pem(cert_pem) {
            Ok(info) => info,
            Err(e) => {
                return VerificationReport::failed(format!(
                    "Certificate could not be parsed: {e}"
                ));
            }
        };

        let mut caveats = Vec::new();

        let crypto_valid =
            lotus_crypto::verify(info.algorithm, &info.public_key, message, signature)
                .unwrap_or(false);

        let temporally_valid = info.is_valid_at(OffsetDateTime::now_utc());

        let revocation = match self.revocation.check(info.serial) {
            Ok(RevocationCheck::Good) => RevocationOutcome::Good,
            Ok(RevocationCheck::Revoked { reason }) => RevocationOutcome::Revoked(reason),
            Err(e) => {
                warn!(serial = info.serial, error = %e, "revocation lookup failed");
                caveats.push("Revocation status could not be determined".to_string());
                RevocationOutcome::Unknown
            }
        };

        // Signing certificates must be end-entity certificates
        let structurally_valid = !info.is_ca;
        if !structurally_valid {
            caveats.push("Signer certificate is a CA certificate".to_string());
        }

        let verdict = if !crypto_valid
            || !temporally_valid
            || !structurally_valid
            || matches!(revocation, RevocationOutcome::Revoked(_))
        {
            Verdict::Invalid
        } else if caveats.is_empty() {
            Verdict::Valid
        } else {
            Verdict::ValidWithCaveat
        };

        VerificationReport {
            crypto_valid,
            temporally_valid,
            revocation,
            structurally_valid,
            caveats,
            verdict,
        }
    }
}

/// The message an officer countersignature covers: a digest binding the
/// document hash to the user's signature
pub fn countersign_message(document_hash_b64: &str, user_signature_b64: &str) -> [u8; 32] {
    hash::sha256(format!("{document_hash_b64}:{user_signature_b64}").as_bytes())
}

/// A document signed by a user and countersigned by an authorizing officer
#[derive(Debug, Clone, Serialize)]
pub struct CounterSignedDocument {
    pub document_hash_b64: String,
    pub user_signature_b64: String,
    pub user_certificate_pem: String,
    pub officer_signature_b64: String,
    pub officer_certificate_pem: String,
    /// Timestamp over the officer signature, when the TSA was reachable
    pub timestamp: Option<TimestampToken>,
}

/// Verification result for a countersigned document
#[derive(Debug, Clone, Serialize)]
pub struct CounterSignatureReport {
    pub user: VerificationReport,
    pub officer: VerificationReport,
    /// None when the document carries no timestamp token
    pub timestamp_valid: Option<bool>,
    pub verdict: Verdict,
}

impl<'a> Verifier<'a> {
    /// Verify both signatures of a countersigned document and its timestamp
    pub fn verify_countersigned(&self, doc: &CounterSignedDocument) -> CounterSignatureReport {
        let document_hash = hash::b64_decode(&doc.document_hash_b64).unwrap_or_default();
        let user_signature = hash::b64_decode(&doc.user_signature_b64).unwrap_or_default();
        let officer_signature = hash::b64_decode(&doc.officer_signature_b64).unwrap_or_default();

        let user =
            self.verify_document(&doc.user_certificate_pem, &document_hash, &user_signature);

        let countersigned =
            countersign_message(&doc.document_hash_b64, &doc.user_signature_b64);
        let officer = self.verify_document(
            &doc.officer_certificate_pem,
            &countersigned,
            &officer_signature,
        );

        let timestamp_valid = doc
            .timestamp
            .as_ref()
            .map(|token| token.verify_against(&officer_signature));

        let verdict = if user.verdict == Verdict::Invalid
            || officer.verdict == Verdict::Invalid
            || timestamp_valid == Some(false)
        {
            Verdict::Invalid
        } else if user.verdict == Verdict::ValidWithCaveat
            || officer.verdict == Verdict::ValidWithCaveat
            || timestamp_valid.is_none()
        {
            Verdict::ValidWithCaveat
        } else {
            Verdict::Valid
        };

        CounterSignatureReport {
            user,
            officer,
            timestamp_valid,
            verdict,
        }
    }
}
