#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::expect_used))]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

/// Configuration and lookup errors
pub mod error;

/// HOTP (HMAC-based One-Time Password) generation and verification
pub mod hotp;

/// TOTP (Time-based One-Time Password) generation and verification
pub mod totp;

/// Single-use enforcement of accepted time steps
pub mod replay;

/// Second-factor check for host authentication pipelines
pub mod authenticator;

pub use authenticator::{AuthOutcome, RejectReason, SecretSource, SubjectSecret, TotpAuthenticator};
pub use error::{AuthenticationError, ConfigurationError, SecretLookupError};
pub use hotp::HotpAlgorithm;
pub use totp::{TotpOptions, TotpSecret};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
