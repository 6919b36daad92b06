//! One-time-password derivation for the token exchange.
//!
//! The platform gates its token endpoint behind a TOTP computed from secret
//! bytes embedded in its own web assets. The bytes are lightly obfuscated;
//! the deobfuscation scheme is reverse engineered and tied to the secret's
//! version, so it sits behind the `OtpSeedDeriver` trait and can be swapped
//! when the upstream rotates it without touching the rest of the pipeline.

use crate::errors::HarvestError;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const OTP_PERIOD_SECS: i64 = 30;
const OTP_DIGITS: u32 = 6;

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// Turns a raw obfuscated secret into a base32 OTP seed.
pub trait OtpSeedDeriver: Send + Sync {
    fn derive_seed(&self, secret_bytes: &[u8], version: u32) -> String;
}

/// Derivation scheme observed for secret versions up to 8.
///
/// Each byte at position `t` with value `e` becomes `e XOR ((t mod 33) + 9)`.
/// The resulting integers are concatenated as decimal strings, and the ASCII
/// bytes of that string are base32 encoded (uppercase, no padding).
pub struct PositionXorSeedDeriver;

impl OtpSeedDeriver for PositionXorSeedDeriver {
    fn derive_seed(&self, secret_bytes: &[u8], _version: u32) -> String {
        let digits: String = secret_bytes
            .iter()
            .enumerate()
            .map(|(t, e)| (e ^ ((t % 33) as u8 + 9)).to_string())
            .collect();
        base32::encode(BASE32, digits.as_bytes())
    }
}

/// RFC 4226 HOTP with a SHA-1 digest, truncated to six digits.
pub fn hotp(seed_base32: &str, counter: u64) -> Result<String, HarvestError> {
    let key = base32::decode(BASE32, seed_base32)
        .ok_or_else(|| HarvestError::Auth("OTP seed is not valid base32".to_string()))?;
    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| HarvestError::Auth(format!("invalid HOTP key: {}", e)))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0x0f) as usize;
    let binary = (u32::from(digest[offset]) & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);
    let code = binary % 10u32.pow(OTP_DIGITS);

    Ok(format!("{:06}", code))
}

/// Time-stepped OTP over a 30 second period.
pub fn totp(seed_base32: &str, epoch_seconds: i64) -> Result<String, HarvestError> {
    hotp(seed_base32, (epoch_seconds / OTP_PERIOD_SECS) as u64)
}
