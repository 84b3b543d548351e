//! Post-quantum PKI engine: a hierarchical ML-DSA certificate authority
//! with CSR handling, revocation, CRL publication, trusted timestamping and
//! a four-check document verification pipeline.

pub mod ca;
pub mod cert;
pub mod crl;
pub mod csr;
pub mod dn;
pub mod error;
pub mod tsa;
pub mod verify;

pub use ca::{
    CaEngine, CaKeyVault, CaLevel, CaStatus, CascadeOutcome, CertStatus, CertificateAuthority,
    EnginePolicy, IssueRequest, IssuedCertificate, MemoryKeyVault, RevocationInfo,
};
pub use cert::{CertProfile, CertificateInfo, IssuanceParams};
pub use csr::Csr;
pub use dn::DnSubject;
pub use error::{PkiError, Result};
pub use tsa::{InProcessTimestampAuthority, TimestampAuthority, TimestampToken};
pub use verify::{
    countersign_message, CounterSignatureReport, CounterSignedDocument, RevocationCheck,
    RevocationOutcome, RevocationStatus, VerificationReport, Verdict, Verifier,
};
