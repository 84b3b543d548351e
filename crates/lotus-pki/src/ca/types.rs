//! Data model for the CA hierarchy ledger

use lotus_crypto::SignatureAlgorithm;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Position of a CA in the national hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaLevel {
    Root,
    Provincial,
    District,
    Internal,
}

impl CaLevel {
    /// Minimum signature algorithm mandated for keys at this level
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            CaLevel::Root | CaLevel::Provincial => SignatureAlgorithm::MlDsa87,
            CaLevel::District | CaLevel::Internal => SignatureAlgorithm::MlDsa65,
        }
    }

    /// Whether a CA of this level may be created under the given parent level
    pub fn valid_under(&self, parent: CaLevel) -> bool {
        matches!(
            (self, parent),
            (CaLevel::Provincial, CaLevel::Root)
                | (CaLevel::District, CaLevel::Provincial)
                | (CaLevel::Internal, CaLevel::Root)
        )
    }

    /// Certificate lifetime for a CA at this level
    pub fn validity_days(&self) -> u32 {
        match self {
            CaLevel::Root => 3650,
            _ => 1825,
        }
    }
}

/// Lifecycle status of a CA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaStatus {
    Active,
    Revoked,
    Expired,
}

/// Lifecycle status of an issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertStatus {
    Active,
    Revoked,
    Expired,
}

/// A certificate authority in the ledger
///
/// The private key never appears here; it lives in the key vault under the
/// CA id.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateAuthority {
    pub id: Uuid,
    pub name: String,
    pub level: CaLevel,
    pub parent_id: Option<Uuid>,
    pub algorithm: SignatureAlgorithm,
    pub subject_dn: String,
    pub certificate_pem: String,
    pub status: CaStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    pub revocation_reason: Option<String>,
}

/// An end-entity certificate in the append-only ledger
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub id: Uuid,
    pub issuing_ca: Uuid,
    pub username: String,
    pub subject_dn: String,
    pub serial: u64,
    pub certificate_pem: String,
    pub public_key_pem: String,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
    pub status: CertStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    pub revocation_reason: Option<String>,
}

/// Answer to a revocation-status query
#[derive(Debug, Clone, Serialize)]
pub struct RevocationInfo {
    pub status: CertStatus,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

/// Result of a cascade revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub cas_revoked: usize,
    pub certificates_revoked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_algorithm_floor() {
        assert_eq!(CaLevel::Root.algorithm(), SignatureAlgorithm::MlDsa87);
        assert_eq!(CaLevel::Provincial.algorithm(), SignatureAlgorithm::MlDsa87);
        assert_eq!(CaLevel::District.algorithm(), SignatureAlgorithm::MlDsa65);
        assert_eq!(CaLevel::Internal.algorithm(), SignatureAlgorithm::MlDsa65);
    }

    #[test]
    fn test_hierarchy_rules() {
        assert!(CaLevel::Provincial.valid_under(CaLevel::Root));
        assert!(CaLevel::District.valid_under(CaLevel::Provincial));
        assert!(CaLevel::Internal.valid_under(CaLevel::Root));

        assert!(!CaLevel::Root.valid_under(CaLevel::Root));
        assert!(!CaLevel::District.valid_under(CaLevel::Root));
        assert!(!CaLevel::Provincial.valid_under(CaLevel::Provincial));
        assert!(!CaLevel::Internal.valid_under(CaLevel::Provincial));
    }

    #[test]
    fn test_level_serde_names() {
        assert_eq!(
            serde_json::to_string(&CaLevel::Provincial).unwrap(),
            "\"PROVINCIAL\""
        );
    }
}
