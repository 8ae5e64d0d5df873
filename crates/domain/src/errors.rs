//! Error types surfaced to callers of the API client
//!
//! Every failure a caller can observe is a [`ClientError`]. Transport
//! details never leak: anything that is not an open circuit, an expired
//! session or a deadline becomes an [`ApiError`] with a normalized code.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{HTTP_ERROR_CODE_PREFIX, NETWORK_ERROR_CODE, UNKNOWN_ERROR_CODE};

/// Normalized error code: `HTTP_<status>`, `NETWORK_ERROR` or `UNKNOWN_ERROR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErrorCode {
    /// The server answered with this error status
    Http(u16),
    /// No response was received
    Network,
    /// Anything else, including unreadable success bodies
    Unknown,
}

impl ErrorCode {
    /// HTTP status behind the code, if any
    pub fn status(self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(status),
            Self::Network | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(status) => write!(f, "{HTTP_ERROR_CODE_PREFIX}{status}"),
            Self::Network => f.write_str(NETWORK_ERROR_CODE),
            Self::Unknown => f.write_str(UNKNOWN_ERROR_CODE),
        }
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            NETWORK_ERROR_CODE => Ok(Self::Network),
            UNKNOWN_ERROR_CODE => Ok(Self::Unknown),
            _ => s
                .strip_prefix(HTTP_ERROR_CODE_PREFIX)
                .and_then(|status| status.parse().ok())
                .map(Self::Http)
                .ok_or_else(|| format!("Invalid ErrorCode: {s}")),
        }
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.to_string()
    }
}

/// Normalized API failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Response body of the failed request, when there was one
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    /// Request path the error belongs to
    pub path: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, timestamp: Utc::now(), path: path.into() }
    }

    /// Error for a response with a non-2xx status
    ///
    /// The message comes from the body's `message` or `error` field, falling
    /// back to a generic status line.
    pub fn from_status(status: u16, body: &serde_json::Value, path: impl Into<String>) -> Self {
        let message = ["message", "error"]
            .iter()
            .find_map(|field| body.get(field).and_then(serde_json::Value::as_str))
            .map_or_else(|| format!("Request failed with status {status}"), str::to_string);
        let details = (!body.is_null()).then(|| body.clone());

        Self { details, ..Self::new(ErrorCode::Http(status), message, path) }
    }

    /// Error for a request that never got a response
    pub fn network(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message, path)
    }

    pub fn unknown(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message, path)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.code.status()
    }
}

/// Every terminal outcome of a client request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The circuit breaker is open; no request was sent
    #[error("Service temporarily unavailable: circuit breaker is open")]
    CircuitOpen,

    /// The session could not be renewed; the user must sign in again
    #[error("Authentication expired: {reason}")]
    AuthenticationExpired { reason: String },

    /// The request deadline elapsed
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientError {
    /// Stable machine-readable code
    pub fn code(&self) -> String {
        match self {
            Self::CircuitOpen => "CIRCUIT_OPEN".to_string(),
            Self::AuthenticationExpired { .. } => "AUTHENTICATION_EXPIRED".to_string(),
            Self::Timeout { .. } => "TIMEOUT".to_string(),
            Self::Api(error) => error.code.to_string(),
        }
    }

    /// HTTP status for API errors that carry one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(error) => error.status(),
            _ => None,
        }
    }

    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            _ => None,
        }
    }
}

/// Configuration and wiring errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ClinicDeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for configuration and wiring
pub type Result<T> = std::result::Result<T, ClinicDeskError>;
