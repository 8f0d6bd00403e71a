use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use compact_str::CompactString;

use crate::error::{AuthenticationError, SecretLookupError};
use crate::replay::ReplayGuard;
use crate::totp::{self, TotpOptions, TotpSecret};

/// Key material enrolled for one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSecret {
    /// The shared key
    pub secret: TotpSecret,
    /// Subject-specific time step, overriding [TotpOptions::period]
    pub period: Option<u64>,
}

impl SubjectSecret {
    /// Secret using the authenticator's default period
    pub fn new(secret: TotpSecret) -> Self {
        Self {
            secret,
            period: None,
        }
    }

    /// Secret with its own period
    pub fn with_period(secret: TotpSecret, period: u64) -> Self {
        Self {
            secret,
            period: Some(period),
        }
    }
}

/// Resolves the secret of an already authenticated subject.
///
/// Implemented by the host's credential store.
pub trait SecretSource {
    /// Look up the secret for `subject`
    fn lookup(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<SubjectSecret, SecretLookupError>> + Send;
}

impl SecretSource for HashMap<CompactString, SubjectSecret> {
    async fn lookup(&self, subject: &str) -> Result<SubjectSecret, SecretLookupError> {
        self.get(subject)
            .cloned()
            .ok_or_else(|| SecretLookupError::UnknownSubject(subject.into()))
    }
}

/// Why a submitted code was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Empty, non-numeric or of the wrong length
    Malformed,
    /// Well formed but matches no step in the window
    Mismatch,
    /// Matches a step that was already used
    Replayed,
}

/// Result of a verification that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The code is valid for this time step
    Accepted {
        /// The counter the code matched
        counter: u64,
    },
    /// The code is not valid
    Rejected(RejectReason),
}

impl AuthOutcome {
    /// Whether the subject passed the second factor
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted { .. })
    }
}

/// Second-factor check for a host authentication pipeline
pub struct TotpAuthenticator<S> {
    source: S,
    options: TotpOptions,
    replay_guard: Option<Arc<dyn ReplayGuard + Send + Sync>>,
}

impl<S: SecretSource> TotpAuthenticator<S> {
    /// Name under which the authenticator registers with a host pipeline
    pub const NAME: &'static str = "otp";

    /// Creates a new [TotpAuthenticator] with default options
    pub fn new(source: S) -> Self {
        Self::with_options(source, TotpOptions::default())
    }

    /// Creates a new [TotpAuthenticator] with the given options
    pub fn with_options(source: S, options: TotpOptions) -> Self {
        Self {
            source,
            options,
            replay_guard: None,
        }
    }

    /// Refuse codes whose time step was already accepted for the subject
    pub fn with_replay_guard(self, guard: Arc<dyn ReplayGuard + Send + Sync>) -> Self {
        Self {
            replay_guard: Some(guard),
            ..self
        }
    }

    /// Options applied to every check
    pub fn options(&self) -> &TotpOptions {
        &self.options
    }

    /// Verify `submitted` for `subject` against the current time
    pub async fn authenticate(
        &self,
        subject: &str,
        submitted: &str,
    ) -> Result<AuthOutcome, AuthenticationError> {
        self.authenticate_at(subject, submitted, SystemTime::now())
            .await
    }

    /// Verify `submitted` for `subject` at `timestamp`
    ///
    /// A wrong or malformed code is `Ok(AuthOutcome::Rejected(..))`. `Err` means
    /// the check could not run: the secret was unavailable or the options are
    /// invalid.
    pub async fn authenticate_at(
        &self,
        subject: &str,
        submitted: &str,
        timestamp: SystemTime,
    ) -> Result<AuthOutcome, AuthenticationError> {
        let SubjectSecret { secret, period } = self
            .source
            .lookup(subject)
            .await
            .inspect_err(|e| tracing::warn!(subject, error = %e, "TOTP secret lookup failed"))?;

        let options = match period {
            Some(period) => self.options.with_period(period),
            None => self.options,
        };

        let matched = totp::find_counter_at(submitted, secret.as_ref(), &options, timestamp)
            .inspect_err(|e| tracing::warn!(subject, error = %e, "invalid TOTP configuration"))?;

        let Some(counter) = matched else {
            let reason = if totp::is_well_formed(submitted, options.digits) {
                RejectReason::Mismatch
            } else {
                RejectReason::Malformed
            };
            tracing::debug!(subject, ?reason, "TOTP code rejected");
            return Ok(AuthOutcome::Rejected(reason));
        };

        if let Some(guard) = &self.replay_guard {
            if !guard.try_accept(subject, counter) {
                tracing::debug!(subject, counter, "TOTP code replayed");
                return Ok(AuthOutcome::Rejected(RejectReason::Replayed));
            }
        }

        tracing::debug!(subject, counter, "TOTP code accepted");
        Ok(AuthOutcome::Accepted { counter })
    }
}
