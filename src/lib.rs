//! # Lotus
//!
//! Post-quantum PKI and remote signing authorization engine.
//!
//! ## Crates
//!
//! - `lotus_crypto` - ML-DSA / ML-KEM primitives, digests, TOTP
//! - `lotus_pki` - CA hierarchy, certificates, verification pipeline
//! - `lotus_sign` - signing challenges, SAD validation, key custody

// Re-export all sub-crates
pub use lotus_crypto;
pub use lotus_pki;
pub use lotus_sign;
