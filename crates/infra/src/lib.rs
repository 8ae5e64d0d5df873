//! # ClinicDesk Infrastructure
//!
//! Infrastructure implementations of the core client ports.
//!
//! This crate contains:
//! - HTTP transport over reqwest
//! - Token refresher and in-memory session store
//! - SQLite persistent cache tier
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `clinicdesk-core`
//! - Contains all "impure" code (network, filesystem, environment)

use std::sync::Arc;

use clinicdesk_core::{ResilientClient, SessionExpiredHook, SessionStore, Transport};
use clinicdesk_domain::{ClientConfig, Result};
use tracing::warn;

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use auth::{HttpTokenRefresher, InMemorySessionStore};
pub use errors::{IntoStoreError, IntoTransportError};
pub use http::{ReqwestTransport, ReqwestTransportBuilder};
pub use observability::{init_tracing, LogFormat};
pub use storage::SqliteTier;

/// Wire a [`ResilientClient`] to the production adapters
///
/// The refresher shares the raw reqwest transport, so token refresh never
/// passes through retry or the circuit breaker. When `cache_path` is set the
/// response cache is mirrored into SQLite; if the file cannot be opened the
/// client falls back to a memory-only cache.
///
/// # Errors
/// Returns `ClinicDeskError::Config` if the configuration is invalid or the
/// HTTP client cannot be built.
pub fn build_client(
    config: ClientConfig,
    session: Arc<dyn SessionStore>,
    on_session_expired: Arc<dyn SessionExpiredHook>,
) -> Result<ResilientClient> {
    config.validate()?;

    let mut transport = ReqwestTransport::builder();
    if let Some(timeout) = config.request_timeout {
        transport = transport.timeout(timeout);
    }
    let transport: Arc<dyn Transport> = Arc::new(transport.build()?);
    let refresher = Arc::new(HttpTokenRefresher::new(transport.clone(), config.refresh_url()));

    let mut builder = ResilientClient::builder(config.clone())
        .transport(transport)
        .session(session)
        .refresher(refresher)
        .on_session_expired(on_session_expired);

    if let Some(path) = &config.cache_path {
        match SqliteTier::open(path) {
            Ok(tier) => builder = builder.cache_tier(Arc::new(tier)),
            Err(error) => {
                warn!(path = %path.display(), %error, "Persistent cache unavailable, using memory only");
            }
        }
    }

    builder.build()
}
