use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use ring::hmac;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ConfigurationError;

/// The default length of a generated code
pub const DEFAULT_DIGITS: u32 = 6;

/// The longest code the 31-bit truncated value can fill
pub const MAX_DIGITS: u32 = 10;

/// Keyed hash used to derive the code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HotpAlgorithm {
    /// HMAC-SHA-1, the RFC 6238 default
    #[default]
    #[serde(rename = "SHA1", alias = "sha1")]
    Sha1,
    /// HMAC-SHA-256
    #[serde(rename = "SHA256", alias = "sha256")]
    Sha256,
    /// HMAC-SHA-512
    #[serde(rename = "SHA512", alias = "sha512")]
    Sha512,
}

impl HotpAlgorithm {
    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            // SHA-1 is what every authenticator app speaks.
            HotpAlgorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            HotpAlgorithm::Sha256 => hmac::HMAC_SHA256,
            HotpAlgorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }

    /// Name as it appears in otpauth URIs
    pub fn as_str(self) -> &'static str {
        match self {
            HotpAlgorithm::Sha1 => "SHA1",
            HotpAlgorithm::Sha256 => "SHA256",
            HotpAlgorithm::Sha512 => "SHA512",
        }
    }
}

impl fmt::Display for HotpAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HotpAlgorithm {
    type Err = ConfigurationError;

    /// Accepts `SHA1`, `sha-256`, `Sha512` and similar spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: CompactString = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "SHA1" => Ok(HotpAlgorithm::Sha1),
            "SHA256" => Ok(HotpAlgorithm::Sha256),
            "SHA512" => Ok(HotpAlgorithm::Sha512),
            _ => Err(ConfigurationError::UnsupportedAlgorithm(s.into())),
        }
    }
}

pub(crate) fn validate_digits(digits: u32) -> Result<(), ConfigurationError> {
    if !(1..=MAX_DIGITS).contains(&digits) {
        return Err(ConfigurationError::InvalidDigits(digits));
    }
    Ok(())
}

/// Generate a HOTP code (RFC 4226) for `counter`
///
/// The result is always exactly `digits` ASCII digits, left-padded with zeros.
pub fn generate(
    secret: &[u8],
    counter: u64,
    digits: u32,
    algorithm: HotpAlgorithm,
) -> Result<String, ConfigurationError> {
    if secret.is_empty() {
        return Err(ConfigurationError::EmptySecret);
    }
    validate_digits(digits)?;

    let key = hmac::Key::new(algorithm.hmac_algorithm(), secret);
    let signature = hmac::sign(&key, &counter.to_be_bytes());
    let code = truncate(signature.as_ref()) as u64 % 10u64.pow(digits);
    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// Dynamic truncation, yields a 31-bit value
fn truncate(signature: &[u8]) -> u32 {
    // every supported digest is at least 20 bytes, so offset + 3 stays in bounds
    let offset = (signature[signature.len() - 1] & 0x0f) as usize;
    ((signature[offset] & 0x7f) as u32) << 24
        | (signature[offset + 1] as u32) << 16
        | (signature[offset + 2] as u32) << 8
        | signature[offset + 3] as u32
}

/// Compare two codes without exiting early on the first differing byte
pub fn codes_equal(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

/// HOTP secret
#[derive(Clone, PartialEq, Eq)]
pub struct HotpSecret(Box<[u8]>);

impl fmt::Debug for HotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HotpSecret").field(&"<redacted>").finish()
    }
}

impl AsRef<[u8]> for HotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl HotpSecret {
    /// Create a new HOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Generate a HOTP code
    ///
    /// - `counter`: the counter value
    pub fn generate(
        &self,
        counter: u64,
        digits: u32,
        algorithm: HotpAlgorithm,
    ) -> Result<String, ConfigurationError> {
        generate(&self.0, counter, digits, algorithm)
    }

    /// Check `code` against a single counter value
    pub fn verify(
        &self,
        code: &str,
        counter: u64,
        digits: u32,
        algorithm: HotpAlgorithm,
    ) -> Result<bool, ConfigurationError> {
        let expected = self.generate(counter, digits, algorithm)?;
        Ok(codes_equal(&expected, code))
    }
}
