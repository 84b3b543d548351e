//! Error types for the signing authorization protocol
//!
//! Internally errors stay precise; the public-facing [`Rejection`] collapses
//! everything an attacker could probe (wrong code, expired challenge,
//! missing TOTP enrollment) into one category. The precise cause goes to the
//! log, never to the caller.

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Challenge has expired")]
    ChallengeExpired,

    #[error("Confirmation code is invalid")]
    InvalidCode,

    #[error("Subject has no TOTP enrollment")]
    TotpNotEnrolled,

    #[error("Authorization grant has expired")]
    GrantExpired,

    #[error("Authorization grant covers a different key alias")]
    GrantAliasMismatch,

    #[error("Authorization grant covers a different document digest")]
    GrantDigestMismatch,

    #[error("No key stored under alias {0}")]
    KeyNotFound(String),

    #[error("Identity is not verified")]
    IdentityNotVerified,

    #[error("Key alias is not owned by the authenticated subject")]
    AliasNotOwned,

    #[error("Token error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] lotus_crypto::Error),

    #[error("PKI error: {0}")]
    Pki(#[from] lotus_pki::PkiError),

    #[error("Store error: {0}")]
    StoreError(String),
}

pub type Result<T> = std::result::Result<T, SignError>;

/// What a caller is told when a request is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub code: &'static str,
    pub message: &'static str,
}

impl SignError {
    /// Map to the public rejection, logging the precise cause
    ///
    /// Code and enrollment failures share one category so responses do not
    /// reveal whether a challenge exists, is expired, or got the wrong code.
    pub fn rejection(&self) -> Rejection {
        warn!(cause = %self, "authorization rejected");
        match self {
            SignError::ChallengeNotFound => Rejection {
                code: "CHALLENGE_NOT_FOUND",
                message: "No such signing challenge",
            },
            SignError::ChallengeExpired
            | SignError::InvalidCode
            | SignError::TotpNotEnrolled => Rejection {
                code: "AUTHORIZATION_DENIED",
                message: "Authorization denied",
            },
            SignError::GrantExpired
            | SignError::GrantAliasMismatch
            | SignError::GrantDigestMismatch => Rejection {
                code: "GRANT_INVALID",
                message: "Authorization grant is not valid for this operation",
            },
            SignError::KeyNotFound(_) => Rejection {
                code: "KEY_NOT_FOUND",
                message: "No key stored under this alias",
            },
            SignError::IdentityNotVerified
            | SignError::AliasNotOwned
            | SignError::JwtError(_) => Rejection {
                code: "AUTHENTICATION_FAILED",
                message: "Authentication failed",
            },
            SignError::Crypto(_) | SignError::Pki(_) | SignError::StoreError(_) => Rejection {
                code: "INTERNAL_ERROR",
                message: "Internal error",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_errors_share_one_category() {
        assert_eq!(
            SignError::ChallengeExpired.rejection(),
            SignError::InvalidCode.rejection()
        );
        assert_eq!(
            SignError::InvalidCode.rejection(),
            SignError::TotpNotEnrolled.rejection()
        );
        // Not-found stays distinguishable; ids are unguessable
        assert_ne!(
            SignError::ChallengeNotFound.rejection(),
            SignError::InvalidCode.rejection()
        );
    }
}
