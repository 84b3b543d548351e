//! Certificate authority hierarchy: ledger types, key custody, registry and
//! the engine that ties them together.

pub mod engine;
pub mod registry;
pub mod types;
pub mod vault;

pub use engine::{CaEngine, EnginePolicy, IssueRequest};
pub use registry::CaRegistry;
pub use types::{
    CaLevel, CaStatus, CascadeOutcome, CertStatus, CertificateAuthority, IssuedCertificate,
    RevocationInfo,
};
pub use vault::{CaKeyVault, MemoryKeyVault};
