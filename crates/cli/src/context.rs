//! Application context - client wiring for one invocation

use std::path::Path;
use std::sync::Arc;

use clinicdesk_core::{ResilientClient, SessionExpiredHook};
use clinicdesk_domain::{ClientConfig, Credential, Result};
use clinicdesk_infra::{build_client, config, InMemorySessionStore};
use tracing::{info, warn};

/// Access token used for the first request
pub const ACCESS_TOKEN_VAR: &str = "CLINICDESK_ACCESS_TOKEN";
/// Refresh token used when the access token is rejected
pub const REFRESH_TOKEN_VAR: &str = "CLINICDESK_REFRESH_TOKEN";

/// Holds the configuration, session and client for one run
pub struct AppContext {
    pub config: ClientConfig,
    pub session: Arc<InMemorySessionStore>,
    pub client: ResilientClient,
}

impl AppContext {
    /// Build from a config file, or the environment and probed files
    ///
    /// Tokens come from `CLINICDESK_ACCESS_TOKEN` and
    /// `CLINICDESK_REFRESH_TOKEN`; without an access token requests are
    /// sent unauthenticated.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => config::load_from_file(Some(path.to_path_buf()))?,
            None => config::load()?,
        };
        Self::new(config, credential_from_env())
    }

    pub fn new(config: ClientConfig, credential: Option<Credential>) -> Result<Self> {
        let session = Arc::new(match credential {
            Some(credential) => InMemorySessionStore::with_credential(credential),
            None => InMemorySessionStore::new(),
        });

        let hook: Arc<dyn SessionExpiredHook> =
            Arc::new(|| warn!("Session expired; sign in again and update the token variables"));
        let client = build_client(config.clone(), session.clone(), hook)?;

        info!(base_url = %config.base_url, signed_in = session.is_signed_in(), "Client ready");
        Ok(Self { config, session, client })
    }
}

fn credential_from_env() -> Option<Credential> {
    let access = std::env::var(ACCESS_TOKEN_VAR).ok().filter(|token| !token.is_empty())?;
    match std::env::var(REFRESH_TOKEN_VAR).ok().filter(|token| !token.is_empty()) {
        Some(refresh) => Some(Credential::new(access, refresh)),
        None => Some(Credential::access_only(access)),
    }
}
