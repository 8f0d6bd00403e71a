use std::fmt;
use std::time::SystemTime;

use fast32::base32;
use serde::{Deserialize, Serialize};

use super::hotp::{self, HotpAlgorithm};
use crate::error::ConfigurationError;

/// The default period of TOTP code in seconds
pub const RFC6238_TOTP_PERIOD: u64 = 30;

/// The default number of steps tolerated on each side of the current one
pub const DEFAULT_WINDOW: u32 = 1;

/// Parameters shared by generation and verification.
///
/// Passed explicitly to every call; nothing is configured globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpOptions {
    /// Seconds per counter increment
    pub period: u64,
    /// Length of the code
    pub digits: u32,
    /// Keyed hash
    pub algorithm: HotpAlgorithm,
    /// Steps checked before and after the current one to absorb clock skew
    pub window: u32,
}

impl Default for TotpOptions {
    fn default() -> Self {
        Self {
            period: RFC6238_TOTP_PERIOD,
            digits: hotp::DEFAULT_DIGITS,
            algorithm: HotpAlgorithm::default(),
            window: DEFAULT_WINDOW,
        }
    }
}

impl TotpOptions {
    /// Replace the period
    pub fn with_period(self, period: u64) -> Self {
        Self { period, ..self }
    }

    /// Replace the code length
    pub fn with_digits(self, digits: u32) -> Self {
        Self { digits, ..self }
    }

    /// Replace the hash algorithm
    pub fn with_algorithm(self, algorithm: HotpAlgorithm) -> Self {
        Self { algorithm, ..self }
    }

    /// Replace the skew window
    pub fn with_window(self, window: u32) -> Self {
        Self { window, ..self }
    }

    /// Reject parameters no verification could run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.period == 0 {
            return Err(ConfigurationError::InvalidPeriod);
        }
        hotp::validate_digits(self.digits)
    }
}

/// Time step counter for `timestamp`. Times before the epoch map to step 0.
pub fn counter_at(period: u64, timestamp: SystemTime) -> Result<u64, ConfigurationError> {
    if period == 0 {
        return Err(ConfigurationError::InvalidPeriod);
    }
    Ok(unix_seconds(timestamp) / period)
}

/// Seconds until the code valid at `timestamp` expires
pub fn time_remaining(period: u64, timestamp: SystemTime) -> Result<u64, ConfigurationError> {
    if period == 0 {
        return Err(ConfigurationError::InvalidPeriod);
    }
    Ok(period - unix_seconds(timestamp) % period)
}

fn unix_seconds(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Trimmed code if it is exactly `digits` ASCII digits
fn normalize_submission(submitted: &str, digits: u32) -> Option<&str> {
    let code = submitted.trim();
    if code.len() != digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(code)
}

pub(crate) fn is_well_formed(submitted: &str, digits: u32) -> bool {
    normalize_submission(submitted, digits).is_some()
}

/// Counters to try, nearest first: `c, c-1, c+1, c-2, c+2, ...`
fn window_counters(counter: u64, window: u32) -> impl Iterator<Item = u64> {
    let window = window as u64;
    std::iter::once(Some(counter))
        .chain((1..=window).flat_map(move |delta| {
            [counter.checked_sub(delta), counter.checked_add(delta)]
        }))
        .flatten()
}

/// Find the counter whose code matches `submitted` around `timestamp`.
///
/// `Ok(None)` covers both a malformed submission and a code that matches no
/// step in the window. Only bad parameters produce an error.
pub fn find_counter_at(
    submitted: &str,
    secret: &[u8],
    options: &TotpOptions,
    timestamp: SystemTime,
) -> Result<Option<u64>, ConfigurationError> {
    if secret.is_empty() {
        return Err(ConfigurationError::EmptySecret);
    }
    options.validate()?;

    let Some(code) = normalize_submission(submitted, options.digits) else {
        tracing::debug!(digits = options.digits, "malformed TOTP submission");
        return Ok(None);
    };

    let counter = counter_at(options.period, timestamp)?;
    for candidate in window_counters(counter, options.window) {
        let expected = hotp::generate(secret, candidate, options.digits, options.algorithm)?;
        if hotp::codes_equal(&expected, code) {
            return Ok(Some(candidate));
        }
    }
    tracing::debug!(window = options.window, "TOTP code matched no step in window");
    Ok(None)
}

/// Verify `submitted` against the code for `timestamp`, tolerating `options.window` steps of skew
pub fn verify_at(
    submitted: &str,
    secret: &[u8],
    options: &TotpOptions,
    timestamp: SystemTime,
) -> Result<bool, ConfigurationError> {
    find_counter_at(submitted, secret, options, timestamp).map(|matched| matched.is_some())
}

/// Verify `submitted` against the current system time
pub fn check(
    submitted: &str,
    secret: &[u8],
    options: &TotpOptions,
) -> Result<bool, ConfigurationError> {
    verify_at(submitted, secret, options, SystemTime::now())
}

/// TOTP secret
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret(Box<[u8]>);

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TotpSecret").field(&"<redacted>").finish()
    }
}

impl AsRef<[u8]> for TotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TotpSecret {
    /// Create a new TOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Create a new TOTP secret from a base32 encoded string
    ///
    /// Lowercase letters, whitespace and trailing `=` padding are accepted.
    pub fn try_from_base32(secret: impl AsRef<str>) -> Result<Self, fast32::DecodeError> {
        let normalized: String = secret
            .as_ref()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let secret = base32::RFC4648_NOPAD
            .decode_str(normalized.trim_end_matches('='))?
            .into_boxed_slice();
        Ok(Self(secret))
    }

    /// Generate the TOTP code at the given timestamp
    pub fn generate_at(
        &self,
        options: &TotpOptions,
        timestamp: SystemTime,
    ) -> Result<String, ConfigurationError> {
        let counter = counter_at(options.period, timestamp)?;
        hotp::generate(&self.0, counter, options.digits, options.algorithm)
    }

    /// Verify a TOTP code at the given timestamp
    ///
    /// - `code`: the code to be verified
    /// - `options`: period, length, algorithm and the skew window
    /// - `timestamp`: the time the code is checked against
    pub fn verify_at(
        &self,
        code: &str,
        options: &TotpOptions,
        timestamp: SystemTime,
    ) -> Result<bool, ConfigurationError> {
        verify_at(code, &self.0, options, timestamp)
    }

    /// Verify a TOTP code against the current time
    pub fn check(&self, code: &str, options: &TotpOptions) -> Result<bool, ConfigurationError> {
        check(code, &self.0, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SHA1_SECRET: &[u8] = b"12345678901234567890";
    const SHA256_SECRET: &[u8] = b"12345678901234567890123456789012";
    const SHA512_SECRET: &[u8] =
        b"1234567890123456789012345678901234567890123456789012345678901234";

    fn at(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(seconds)
    }

    fn rfc_options(algorithm: HotpAlgorithm) -> TotpOptions {
        TotpOptions::default()
            .with_digits(8)
            .with_algorithm(algorithm)
            .with_window(0)
    }

    #[test]
    fn rfc6238_appendix_b() {
        let vectors: [(u64, &str, &str, &str); 6] = [
            (59, "94287082", "46119246", "90693936"),
            (1111111109, "07081804", "68084774", "25091201"),
            (1111111111, "14050471", "67062674", "99943326"),
            (1234567890, "89005924", "91819424", "93441116"),
            (2000000000, "69279037", "90698825", "38618901"),
            (20000000000, "65353130", "77737706", "47863826"),
        ];
        let cases = [
            (HotpAlgorithm::Sha1, SHA1_SECRET),
            (HotpAlgorithm::Sha256, SHA256_SECRET),
            (HotpAlgorithm::Sha512, SHA512_SECRET),
        ];
        for (time, sha1, sha256, sha512) in vectors {
            for ((algorithm, key), expected) in cases.iter().zip([sha1, sha256, sha512]) {
                let options = rfc_options(*algorithm);
                let secret = TotpSecret::new(key);
                let code = secret.generate_at(&options, at(time)).expect("valid");
                assert_eq!(code, expected, "{algorithm} at {time}");
                assert!(secret.verify_at(expected, &options, at(time)).expect("valid"));
            }
        }
    }

    #[test]
    fn accepts_current_code() {
        let secret = TotpSecret::new(b"current code secret");
        let options = TotpOptions::default();
        let code = secret.generate_at(&options, SystemTime::now()).expect("valid");
        assert!(secret.check(&code, &options).expect("valid"));
        assert!(check(&code, secret.as_ref(), &options).expect("valid"));
    }

    #[test]
    fn window_tolerates_adjacent_steps_only() {
        let options = TotpOptions::default().with_digits(8);
        let now = at(1_700_000_000);
        let counter = counter_at(options.period, now).expect("valid");
        let code_for = |c: u64| {
            hotp::generate(SHA1_SECRET, c, options.digits, options.algorithm).expect("valid")
        };

        assert_eq!(
            find_counter_at(&code_for(counter), SHA1_SECRET, &options, now),
            Ok(Some(counter))
        );
        assert_eq!(
            find_counter_at(&code_for(counter - 1), SHA1_SECRET, &options, now),
            Ok(Some(counter - 1))
        );
        assert_eq!(
            find_counter_at(&code_for(counter + 1), SHA1_SECRET, &options, now),
            Ok(Some(counter + 1))
        );
        assert!(!verify_at(&code_for(counter - 2), SHA1_SECRET, &options, now).expect("valid"));
        assert!(!verify_at(&code_for(counter + 2), SHA1_SECRET, &options, now).expect("valid"));

        let wide = options.with_window(2);
        assert!(verify_at(&code_for(counter + 2), SHA1_SECRET, &wide, now).expect("valid"));

        let strict = options.with_window(0);
        assert!(!verify_at(&code_for(counter - 1), SHA1_SECRET, &strict, now).expect("valid"));
    }

    #[test]
    fn window_does_not_underflow_at_epoch() {
        let options = TotpOptions::default().with_window(3);
        let code = hotp::generate(SHA1_SECRET, 0, 6, HotpAlgorithm::Sha1).expect("valid");
        assert_eq!(find_counter_at(&code, SHA1_SECRET, &options, at(5)), Ok(Some(0)));
        assert_eq!(
            window_counters(1, 3).collect::<Vec<_>>(),
            vec![1, 0, 2, 3, 4]
        );
        assert_eq!(
            window_counters(u64::MAX, 1).collect::<Vec<_>>(),
            vec![u64::MAX, u64::MAX - 1]
        );
    }

    #[test]
    fn malformed_submissions_are_false_not_errors() {
        let options = TotpOptions::default();
        let now = at(59);
        let code = hotp::generate(SHA1_SECRET, 1, 6, HotpAlgorithm::Sha1).expect("valid");
        for submitted in ["", "   ", "abcdef", "12345a", "12345", "1234567", "१२३४५६"] {
            assert_eq!(verify_at(submitted, SHA1_SECRET, &options, now), Ok(false), "{submitted:?}");
        }
        assert_eq!(
            verify_at(&format!("  {code}\n"), SHA1_SECRET, &options, now),
            Ok(true)
        );
    }

    #[test]
    fn configuration_errors_are_distinct() {
        let options = TotpOptions::default();
        assert_eq!(
            verify_at("123456", b"", &options, at(0)),
            Err(ConfigurationError::EmptySecret)
        );
        // bad configuration wins over a malformed submission
        assert_eq!(
            check("not a code", b"", &options),
            Err(ConfigurationError::EmptySecret)
        );
        assert_eq!(
            check("123456", SHA1_SECRET, &options.with_period(0)),
            Err(ConfigurationError::InvalidPeriod)
        );
        assert_eq!(
            check("123456", SHA1_SECRET, &options.with_digits(11)),
            Err(ConfigurationError::InvalidDigits(11))
        );
    }

    #[test]
    fn counter_and_remaining_time() {
        assert_eq!(counter_at(30, at(59)), Ok(1));
        assert_eq!(counter_at(60, at(59)), Ok(0));
        assert_eq!(counter_at(30, SystemTime::UNIX_EPOCH - Duration::from_secs(10)), Ok(0));
        assert_eq!(time_remaining(30, at(59)), Ok(1));
        assert_eq!(time_remaining(30, at(60)), Ok(30));
        assert_eq!(counter_at(0, at(59)), Err(ConfigurationError::InvalidPeriod));
    }

    #[test]
    fn decodes_base32_secret() {
        let expected = TotpSecret::new(SHA1_SECRET);
        assert_eq!(
            TotpSecret::try_from_base32("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").expect("valid"),
            expected
        );
        assert_eq!(
            TotpSecret::try_from_base32("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").expect("valid"),
            expected
        );
        assert!(TotpSecret::try_from_base32("not base32!").is_err());
    }

    #[test]
    fn options_from_config() {
        let options: TotpOptions =
            serde_json::from_str(r#"{"period": 60, "algorithm": "SHA256"}"#).expect("valid json");
        assert_eq!(
            options,
            TotpOptions::default()
                .with_period(60)
                .with_algorithm(HotpAlgorithm::Sha256)
        );
        let json = serde_json::to_value(TotpOptions::default()).expect("serializable");
        assert_eq!(json["algorithm"], "SHA1");
        assert_eq!(json["digits"], 6);
    }
}
