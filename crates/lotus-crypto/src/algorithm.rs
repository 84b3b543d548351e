//! ML-DSA algorithm identifiers
//!
//! Closed set of supported signature algorithms with their FIPS 204 OIDs.
//! The legacy Dilithium display names are accepted on parse only and map
//! onto the corresponding ML-DSA parameter sets.

use std::{fmt, str::FromStr};

use der::asn1::ObjectIdentifier;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// OID for ML-DSA-44 (FIPS 204, NIST security category 2)
pub const ML_DSA_44_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.3.17");

/// OID for ML-DSA-65 (FIPS 204, NIST security category 3)
pub const ML_DSA_65_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.3.18");

/// OID for ML-DSA-87 (FIPS 204, NIST security category 5)
pub const ML_DSA_87_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.3.19");

/// OID for ML-KEM-768 (FIPS 203)
pub const ML_KEM_768_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.4.2");

/// Supported ML-DSA signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureAlgorithm {
    /// ML-DSA-44 (NIST category 2), end-entity use
    MlDsa44,
    /// ML-DSA-65 (NIST category 3)
    MlDsa65,
    /// ML-DSA-87 (NIST category 5), root and provincial CA use
    MlDsa87,
}

impl SignatureAlgorithm {
    /// All supported algorithms, weakest first
    pub const ALL: [SignatureAlgorithm; 3] = [
        SignatureAlgorithm::MlDsa44,
        SignatureAlgorithm::MlDsa65,
        SignatureAlgorithm::MlDsa87,
    ];

    /// Canonical algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::MlDsa44 => "ML-DSA-44",
            SignatureAlgorithm::MlDsa65 => "ML-DSA-65",
            SignatureAlgorithm::MlDsa87 => "ML-DSA-87",
        }
    }

    /// Legacy Bouncy-Castle era display name for the same parameter set
    pub fn legacy_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::MlDsa44 => "Dilithium2",
            SignatureAlgorithm::MlDsa65 => "Dilithium3",
            SignatureAlgorithm::MlDsa87 => "Dilithium5",
        }
    }

    /// NIST security category (2, 3, or 5)
    pub fn security_category(&self) -> u8 {
        match self {
            SignatureAlgorithm::MlDsa44 => 2,
            SignatureAlgorithm::MlDsa65 => 3,
            SignatureAlgorithm::MlDsa87 => 5,
        }
    }

    /// Object identifier used in SPKI and signature algorithm fields
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::MlDsa44 => ML_DSA_44_OID,
            SignatureAlgorithm::MlDsa65 => ML_DSA_65_OID,
            SignatureAlgorithm::MlDsa87 => ML_DSA_87_OID,
        }
    }

    /// Resolve an algorithm from its OID
    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        if oid == ML_DSA_44_OID {
            Ok(SignatureAlgorithm::MlDsa44)
        } else if oid == ML_DSA_65_OID {
            Ok(SignatureAlgorithm::MlDsa65)
        } else if oid == ML_DSA_87_OID {
            Ok(SignatureAlgorithm::MlDsa87)
        } else {
            Err(Error::UnsupportedAlgorithm(oid.to_string()))
        }
    }

    /// Encoded verifying key length in bytes
    pub fn verifying_key_len(&self) -> usize {
        match self {
            SignatureAlgorithm::MlDsa44 => 1312,
            SignatureAlgorithm::MlDsa65 => 1952,
            SignatureAlgorithm::MlDsa87 => 2592,
        }
    }

    /// Encoded signing key length in bytes
    pub fn signing_key_len(&self) -> usize {
        match self {
            SignatureAlgorithm::MlDsa44 => 2560,
            SignatureAlgorithm::MlDsa65 => 4032,
            SignatureAlgorithm::MlDsa87 => 4896,
        }
    }

    /// Encoded signature length in bytes
    pub fn signature_len(&self) -> usize {
        match self {
            SignatureAlgorithm::MlDsa44 => 2420,
            SignatureAlgorithm::MlDsa65 => 3309,
            SignatureAlgorithm::MlDsa87 => 4627,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    /// Parse a canonical or legacy algorithm name
    ///
    /// Unknown names are an error, never a silent default.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ML-DSA-44" | "Dilithium2" => Ok(SignatureAlgorithm::MlDsa44),
            "ML-DSA-65" | "Dilithium3" => Ok(SignatureAlgorithm::MlDsa65),
            "ML-DSA-87" | "Dilithium5" => Ok(SignatureAlgorithm::MlDsa87),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl Serialize for SignatureAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SignatureAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
