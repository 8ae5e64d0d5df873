use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use clinicdesk_core::{Transport, TransportError, TransportRequest, TransportResponse};
use clinicdesk_domain::{ClinicDeskError, HttpMethod};
use reqwest::{Client as ReqwestClient, Method, Response};
use serde_json::Value;
use tracing::debug;

use crate::errors::IntoTransportError;

/// [`Transport`] over a shared reqwest client.
///
/// Every response the server sends is returned as-is, error statuses
/// included; retries and auth handling live in the core client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, ClinicDeskError> {
        Self::builder().build()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = to_method(request.method);
        debug!(%method, url = %request.url, "sending HTTP request");

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            debug!(%method, url = %request.url, error = %err, "HTTP request failed");
            err.into_transport()
        })?;

        let status = response.status().as_u16();
        debug!(%method, url = %request.url, status, "received HTTP response");
        read_response(response).await
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

async fn read_response(response: Response) -> Result<TransportResponse, TransportError> {
    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();

    let bytes = response.bytes().await.map_err(IntoTransportError::into_transport)?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok(TransportResponse { status, headers, body })
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
    accept_invalid_certs: bool,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some(concat!("clinicdesk/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: None,
            accept_invalid_certs: false,
        }
    }
}

impl ReqwestTransportBuilder {
    /// I/O timeout for a single HTTP exchange.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, ClinicDeskError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|err| ClinicDeskError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(ReqwestTransport { client })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::builder().timeout(Duration::from_secs(2)).build().expect("transport")
    }

    #[tokio::test]
    async fn returns_json_body_and_lowercased_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/patients/1"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Total-Count", "1")
                    .set_body_json(json!({ "id": 1, "name": "Ana" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request =
            TransportRequest::new(HttpMethod::Get, format!("{}/patients/1", server.uri()))
                .with_header("Authorization", "Bearer abc");
        let response = transport().send(request).await.expect("response");

        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "id": 1, "name": "Ana" }));
        assert_eq!(response.header("X-Total-Count"), Some("1"));
    }

    #[tokio::test]
    async fn error_statuses_are_responses_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let request = TransportRequest::new(HttpMethod::Delete, server.uri());
        let response = transport().send(request).await.expect("response");

        assert_eq!(response.status, 503);
        assert_eq!(response.body, json!("upstream down"));
    }

    #[tokio::test]
    async fn sends_json_body_and_maps_empty_body_to_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "name": "Dr. Vega" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let request = TransportRequest::new(HttpMethod::Post, server.uri())
            .with_body(json!({ "name": "Dr. Vega" }));
        let response = transport().send(request).await.expect("response");

        assert_eq!(response.status, 204);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let request = TransportRequest::new(HttpMethod::Get, format!("http://{addr}"));
        let result = transport().send(request).await;

        match result {
            Err(TransportError::Network { .. }) => {}
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_header_is_invalid_request() {
        let request = TransportRequest::new(HttpMethod::Get, "http://127.0.0.1:9/x")
            .with_header("X-Bad", "line\nbreak");
        let result = transport().send(request).await;

        assert!(matches!(result, Err(TransportError::InvalidRequest { .. })));
    }
}
