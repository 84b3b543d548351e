use thiserror::Error;
use uuid::Uuid;

/// Error type for the PKI engine
#[derive(Error, Debug)]
pub enum PkiError {
    /// CA lookup by id failed
    #[error("CA not found: {0}")]
    CaNotFound(Uuid),

    /// Referenced parent CA does not exist
    #[error("Parent CA not found: {0}")]
    ParentNotFound(Uuid),

    /// Referenced parent CA exists but is revoked or expired
    #[error("Parent CA is not active: {0}")]
    ParentNotActive(Uuid),

    /// Requested parent/child level combination is not allowed
    #[error("Hierarchy violation: {0}")]
    InvalidHierarchy(String),

    /// An active root CA already exists and the policy forbids another
    #[error("An active root CA already exists")]
    RootAlreadyExists,

    /// No active CA is available to issue end-entity certificates
    #[error("No active issuing authority available")]
    NoIssuerAvailable,

    /// Chain walk hit a dangling parent reference
    #[error("Certificate chain is broken at CA {0}")]
    BrokenChain(Uuid),

    /// Certificate lookup failed
    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    /// CA private key is missing from the vault
    #[error("CA key unavailable: {0}")]
    KeyUnavailable(Uuid),

    /// CSR related error
    #[error("CSR error: {0}")]
    CsrError(String),

    /// Distinguished name error
    #[error("DN error: {0}")]
    DnError(String),

    /// Certificate related error
    #[error("Certificate error: {0}")]
    CertError(String),

    /// CRL related error
    #[error("CRL error: {0}")]
    CrlError(String),

    /// Verification pipeline error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Timestamp token error
    #[error("Timestamp error: {0}")]
    TimestampError(String),

    /// Store related error
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] lotus_crypto::Error),

    #[error("DER error: {0}")]
    DerError(#[from] der::Error),

    #[error("PEM error: {0}")]
    PemError(#[from] pem::PemError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PkiError>;
