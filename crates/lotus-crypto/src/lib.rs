//! Post-quantum cryptographic primitives
//!
//! ML-DSA signatures over the three FIPS 204 parameter sets, ML-KEM-768
//! hybrid encryption, SPKI/PKCS#8 key codecs, digest helpers, and TOTP
//! second-factor codes.

pub mod algorithm;
pub mod error;
pub mod hash;
pub mod kem;
pub mod pem;
pub mod sign;
pub mod totp;

pub use algorithm::SignatureAlgorithm;
pub use error::{Error, Result};
pub use kem::{HybridCiphertext, MlKemKeyPair};
pub use sign::{verify, MlDsaKeyPair};
