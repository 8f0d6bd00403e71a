use compact_str::CompactString;

/// The integrating application supplied parameters the generator cannot work with.
///
/// This is a programming error on the caller's side, not a routine authentication
/// failure. A malformed or wrong code never produces this error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The shared secret has no bytes
    #[error("TOTP secret is empty")]
    EmptySecret,
    /// Code length is outside `1..=10`
    #[error("TOTP digits must be between 1 and 10, got {0}")]
    InvalidDigits(u32),
    /// Time step of zero seconds
    #[error("TOTP period must be greater than zero")]
    InvalidPeriod,
    /// Hash algorithm name not recognized
    #[error("Unsupported HMAC algorithm: {0}")]
    UnsupportedAlgorithm(CompactString),
}

/// The secret store could not supply key material for a subject
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretLookupError {
    /// No secret is enrolled for the subject
    #[error("No TOTP secret found for subject: {0}")]
    UnknownSubject(CompactString),
    /// The backing store failed
    #[error("Secret storage error: {0}")]
    Storage(CompactString),
}

/// Verification could not run at all.
///
/// Distinct from a rejected code, which is reported as
/// [AuthOutcome::Rejected](crate::authenticator::AuthOutcome::Rejected).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    /// Failed to resolve the subject's secret
    #[error("Failed to look up TOTP secret: {0}")]
    SecretLookup(#[from] SecretLookupError),
    /// Invalid generator or verifier parameters
    #[error("Invalid TOTP configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}
