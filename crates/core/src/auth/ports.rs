//! Port interfaces for session state and token renewal

use async_trait::async_trait;
use clinicdesk_domain::Credential;
use thiserror::Error;

use crate::client::ports::TransportError;

/// Holder of the current credential
///
/// Read before every request, written after a successful refresh and
/// cleared when the session cannot be renewed.
pub trait SessionStore: Send + Sync {
    fn credential(&self) -> Option<Credential>;

    fn set_credential(&self, credential: Credential);

    fn clear_credential(&self);
}

/// Called once each time the session is declared expired
pub trait SessionExpiredHook: Send + Sync {
    fn on_session_expired(&self);
}

impl<F> SessionExpiredHook for F
where
    F: Fn() + Send + Sync,
{
    fn on_session_expired(&self) {
        self()
    }
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionHook;

impl SessionExpiredHook for NoopSessionHook {
    fn on_session_expired(&self) {}
}

/// Why a token refresh did not produce a credential
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid refresh response: {message}")]
    InvalidResponse { message: String },
}

/// Exchanges a refresh token for a new credential
///
/// Implementations talk to the raw transport directly; a refresh never goes
/// through the retry or circuit breaker path.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError>;
}
