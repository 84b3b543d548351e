//! RFC 6238 time-based one-time passwords
//!
//! HMAC-SHA1, 30-second steps, 6 digits, one step of clock skew in either
//! direction. Compatible with Google Authenticator style apps via the
//! otpauth provisioning URI.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Code length in digits
pub const DIGITS: usize = 6;

/// Time step in seconds
pub const STEP_SECONDS: u64 = 30;

/// Accepted clock skew in steps, either direction
pub const SKEW_STEPS: u64 = 1;

const SECRET_LEN: usize = 20;
const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// Generate a fresh random secret, base32 encoded
pub fn generate_secret() -> String {
    let mut secret = [0u8; SECRET_LEN];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    base32::encode(BASE32, &secret)
}

/// Compute the code for a base32 secret at the given unix time
pub fn code_at(secret_b32: &str, unix_time: u64) -> Result<String> {
    let key = decode_secret(secret_b32)?;
    Ok(format!("{:06}", hotp(&key, unix_time / STEP_SECONDS)))
}

/// Compute the code for the current time
pub fn current_code(secret_b32: &str) -> Result<String> {
    code_at(secret_b32, now())
}

/// Verify a submitted code at the given unix time, allowing one step of skew
pub fn verify_at(secret_b32: &str, code: &str, unix_time: u64) -> Result<bool> {
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let key = decode_secret(secret_b32)?;

    let step = unix_time / STEP_SECONDS;
    let first = step.saturating_sub(SKEW_STEPS);
    for candidate in first..=step + SKEW_STEPS {
        if format!("{:06}", hotp(&key, candidate)) == code {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Verify a submitted code against the current time
pub fn verify(secret_b32: &str, code: &str) -> Result<bool> {
    verify_at(secret_b32, code, now())
}

/// Build an otpauth provisioning URI for authenticator apps
pub fn provisioning_uri(secret_b32: &str, issuer: &str, account: &str) -> String {
    let issuer = percent_encode(issuer);
    let account = percent_encode(account);
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret_b32}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
    )
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn decode_secret(secret_b32: &str) -> Result<Vec<u8>> {
    base32::decode(BASE32, secret_b32)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::Other("invalid base32 TOTP secret".to_string()))
}

/// RFC 4226 HOTP with dynamic truncation, reduced to 6 digits
fn hotp(key: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0x0f) as usize;
    let bin = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    bin % 1_000_000
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
