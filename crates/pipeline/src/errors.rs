//! Error and retry-policy types for the Claude node domain.
//!
//! [`CompletionError`] is what the completion service reports for a single
//! call. [`InvalidConfiguration`] covers option strings and node inputs that
//! fail validation before any call is made. [`ChainError`] is the fatal
//! failure of a prompt chain.
//!
//! [`RetryPolicy`] is a cross-cutting concern: every [`CompletionError`] can
//! produce one, and the service implementation uses it to decide whether to
//! re-issue a request.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CombinationMode;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: rate-limit responses, connection failures, timeouts.
/// - `NonRetryable` errors: authentication failures, rejected images,
///   otherwise malformed requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `retry-after` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Completion service errors
// ---------------------------------------------------------------------------

/// Discriminant of a [`CompletionError`], without the detail payload.
///
/// Used in warnings and structured failures so callers can tell a transient
/// issue from a configuration issue without matching on the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    /// The provider throttled the request.
    RateLimited,
    /// The provider rejected the credentials.
    AuthFailed,
    /// The provider could not be reached or returned an unusable response.
    ConnectionError,
    /// An attached image was rejected.
    InvalidImage,
    /// Any other request the provider refused to process.
    InvalidRequest,
}

impl CompletionErrorKind {
    /// Returns `true` for kinds that may clear up on their own (rate limits,
    /// connectivity), as opposed to configuration problems.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::ConnectionError)
    }

    /// Returns the kind as a stable snake_case tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::ConnectionError => "connection_error",
            Self::InvalidImage => "invalid_image",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single completion-service call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CompletionError {
    /// The provider throttled the request (HTTP 429).
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Provider-supplied description.
        message: String,
        /// Delay requested by the provider, if any.
        retry_after: Option<Duration>,
    },

    /// The provider rejected the credentials (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    AuthFailed {
        /// Provider-supplied description.
        message: String,
    },

    /// Network failure, timeout, server-side error, or a response body that
    /// could not be used.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the transport failure.
        message: String,
    },

    /// An attached image was rejected by the provider.
    #[error("Invalid image: {message}")]
    InvalidImage {
        /// Provider-supplied description.
        message: String,
    },

    /// The provider refused the request for a reason other than the above.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Provider-supplied description.
        message: String,
    },
}

impl CompletionError {
    /// Returns the discriminant of this error.
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            Self::RateLimited { .. } => CompletionErrorKind::RateLimited,
            Self::AuthFailed { .. } => CompletionErrorKind::AuthFailed,
            Self::ConnectionError { .. } => CompletionErrorKind::ConnectionError,
            Self::InvalidImage { .. } => CompletionErrorKind::InvalidImage,
            Self::InvalidRequest { .. } => CompletionErrorKind::InvalidRequest,
        }
    }

    /// Returns whether the failed call may be re-issued.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::ConnectionError { .. } => RetryPolicy::Retryable { after: None },
            Self::AuthFailed { .. } | Self::InvalidImage { .. } | Self::InvalidRequest { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }

    /// Creates a [`CompletionError::ConnectionError`].
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// A configuration value or node input failed validation.
///
/// Produced at parse/construction time, never after a service call has been
/// made.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct InvalidConfiguration {
    /// Name of the option or input that failed validation.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl InvalidConfiguration {
    /// Creates a new [`InvalidConfiguration`].
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// A string did not match any variant of a closed option set.
    pub fn unknown_choice(field: &str, value: &str, expected: &[&str]) -> Self {
        Self::new(
            field,
            format!("unknown value '{value}', expected one of: {}", expected.join(", ")),
        )
    }

    /// A required input was absent.
    pub fn missing(field: &str) -> Self {
        Self::new(field, "required input is missing")
    }

    /// Returns a copy of this error attributed to a different field name.
    #[must_use]
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Chain errors
// ---------------------------------------------------------------------------

/// Fatal failure of a prompt chain.
///
/// No partial text accompanies a chain failure: later steps depend on earlier
/// ones, so a partial result would misrepresent completeness.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ChainError {
    /// A chain step's completion call failed. `step` is 1-based.
    #[error("Chain step {step} failed ({kind}): {source}")]
    StepFailed {
        /// 1-based number of the failing step.
        step: usize,
        /// Kind of the underlying failure.
        kind: CompletionErrorKind,
        /// The underlying failure.
        source: CompletionError,
    },

    /// All steps succeeded but the combination call failed.
    #[error("Chain combination '{mode}' failed ({kind}): {source}")]
    CombinationFailed {
        /// Combination mode whose call failed.
        mode: CombinationMode,
        /// Kind of the underlying failure.
        kind: CompletionErrorKind,
        /// The underlying failure.
        source: CompletionError,
    },
}

impl ChainError {
    /// Returns the kind of the underlying completion failure.
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            Self::StepFailed { kind, .. } | Self::CombinationFailed { kind, .. } => *kind,
        }
    }

    /// Returns the 1-based failing step number, or `None` if the combination
    /// call failed.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            Self::CombinationFailed { .. } => None,
        }
    }
}
