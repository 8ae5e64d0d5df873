//! Token refresh over the raw HTTP transport
//!
//! The refresh call deliberately bypasses the resilient client: it is never
//! retried, never counted by the circuit breaker and never re-enters auth
//! recovery.

use std::sync::Arc;

use async_trait::async_trait;
use clinicdesk_core::{RefreshError, TokenRefresher, Transport, TransportRequest};
use clinicdesk_domain::{Credential, HttpMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// [`TokenRefresher`] that POSTs the refresh token to the backend
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    refresh_url: String,
}

impl HttpTokenRefresher {
    /// # Arguments
    ///
    /// * `transport` - Raw transport, not the resilient client
    /// * `refresh_url` - Absolute URL of the refresh endpoint
    pub fn new(transport: Arc<dyn Transport>, refresh_url: impl Into<String>) -> Self {
        Self { transport, refresh_url: refresh_url.into() }
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        debug!(url = %self.refresh_url, "Requesting new access token");

        let body = serde_json::to_value(RefreshRequest { refresh_token }).map_err(|err| {
            RefreshError::InvalidResponse { message: format!("unencodable request: {err}") }
        })?;
        let request = TransportRequest::new(HttpMethod::Post, &self.refresh_url).with_body(body);

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "Token refresh rejected");
            return Err(RefreshError::Rejected { status: response.status });
        }

        let parsed: RefreshResponse = serde_json::from_value(response.body)
            .map_err(|err| RefreshError::InvalidResponse { message: err.to_string() })?;

        info!(rotated = parsed.refresh_token.is_some(), "Access token refreshed");
        Ok(Credential {
            access_token: parsed.access_token,
            // Servers that do not rotate refresh tokens omit it
            refresh_token: Some(parsed.refresh_token.unwrap_or_else(|| refresh_token.to_string())),
        })
    }
}
