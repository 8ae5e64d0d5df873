//! Classification of a single request attempt
//!
//! One attempt either yields a 2xx response or an [`AttemptError`]. The same
//! error feeds three decisions: whether the retry loop tries again, whether
//! the circuit breaker counts it, and which [`ClientError`] the caller sees.

use std::time::Duration;

use clinicdesk_common::{RetryDecision, RetryPolicy};
use clinicdesk_domain::{ApiError, ClientError};
use thiserror::Error;

use super::ports::{TransportError, TransportResponse};
use crate::auth::AuthRecoveryError;

/// Why one attempt did not produce a 2xx response
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    /// The server answered with a non-2xx status
    #[error("Server responded with status {}", .response.status)]
    Status { response: TransportResponse },

    /// No response was received
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session could not be renewed after a 401
    #[error("Authentication expired: {reason}")]
    AuthExpired { reason: String },
}

impl AttemptError {
    /// Whether the backend should be considered unhealthy
    ///
    /// Only 5xx responses and missing responses count; a 4xx means the
    /// backend answered.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            Self::Status { response } => response.status >= 500,
            Self::Transport(TransportError::Network { .. } | TransportError::Timeout { .. }) => true,
            Self::Transport(TransportError::InvalidRequest { .. }) | Self::AuthExpired { .. } => {
                false
            }
        }
    }

    /// Normalize into the caller-facing error for `path`
    pub fn into_client_error(self, path: &str) -> ClientError {
        match self {
            Self::Status { response } => {
                ApiError::from_status(response.status, &response.body, path).into()
            }
            Self::Transport(
                error @ (TransportError::Network { .. } | TransportError::Timeout { .. }),
            ) => ApiError::network(error.to_string(), path).into(),
            Self::Transport(error @ TransportError::InvalidRequest { .. }) => {
                ApiError::unknown(error.to_string(), path).into()
            }
            Self::AuthExpired { reason } => ClientError::AuthenticationExpired { reason },
        }
    }
}

impl From<AuthRecoveryError> for AttemptError {
    fn from(error: AuthRecoveryError) -> Self {
        match error {
            AuthRecoveryError::Expired { reason } => Self::AuthExpired { reason },
            AuthRecoveryError::Replay(error) => Self::Transport(error),
        }
    }
}

/// Retry classification for HTTP attempts
///
/// Network failures and 5xx responses are retried with the configured
/// backoff; a 5xx carrying `Retry-After` in seconds waits that long instead,
/// capped at `max_delay`. Everything else stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRetryPolicy {
    max_delay: Duration,
}

impl HttpRetryPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

impl RetryPolicy<AttemptError> for HttpRetryPolicy {
    fn should_retry(&self, error: &AttemptError, _attempt: u32) -> RetryDecision {
        match error {
            AttemptError::Status { response } if response.status >= 500 => response
                .header("retry-after")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map_or(RetryDecision::Retry, |seconds| {
                    RetryDecision::RetryAfter(Duration::from_secs(seconds).min(self.max_delay))
                }),
            AttemptError::Transport(TransportError::Network { .. } | TransportError::Timeout { .. }) => {
                RetryDecision::Retry
            }
            _ => RetryDecision::Stop,
        }
    }
}
