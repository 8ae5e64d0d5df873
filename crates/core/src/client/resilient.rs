//! Resilient API client
//!
//! Every call follows the same path: cache lookup for reads, then the
//! circuit breaker around a retry loop around one attempt. An attempt that
//! gets a 401 hands the request to the [`AuthRefreshCoordinator`] before the
//! retry policy sees it. Successful reads populate the cache; successful
//! writes invalidate the cached reads of the resource they touched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clinicdesk_common::cache::{CacheConfig, CacheStats, PersistentTier, TieredCache};
use clinicdesk_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, ConfigError,
    Jitter, ResilienceError, ResilienceResult, RetryConfig, RetryError, RetryExecutor,
};
use clinicdesk_domain::constants::{AUTHORIZATION_HEADER, REQUEST_ID_HEADER};
use clinicdesk_domain::{
    ApiError, ClientConfig, ClientError, ClinicDeskError, HttpMethod, JitterMode,
    NormalizedResponse, Page,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::options::RequestOptions;
use super::policy::{AttemptError, HttpRetryPolicy};
use super::ports::{Transport, TransportRequest, TransportResponse};
use crate::auth::{
    AuthRefreshCoordinator, NoopSessionHook, SessionExpiredHook, SessionStore, TokenRefresher,
};

type ClientResult<T> = Result<T, ClientError>;

/// HTTP client with circuit breaking, retries, token refresh and caching
///
/// One instance per backend; all resilience state lives in it.
pub struct ResilientClient {
    config: ClientConfig,
    base_url: Url,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    breaker: CircuitBreaker,
    retry: RetryExecutor<HttpRetryPolicy>,
    auth: AuthRefreshCoordinator,
    cache: TieredCache<NormalizedResponse>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.base_url.as_str())
            .field("breaker", &self.breaker)
            .field("auth", &self.auth)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    pub fn builder(config: ClientConfig) -> ResilientClientBuilder {
        ResilientClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker_metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of token refreshes started by this client
    pub fn refresh_count(&self) -> u64 {
        self.auth.refresh_count()
    }

    /// Drop every cached response
    pub fn invalidate_cache(&self) {
        self.cache.clear();
        info!("Response cache cleared");
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> ClientResult<NormalizedResponse> {
        self.request(HttpMethod::Get, url, None, options).await
    }

    pub async fn post<B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<NormalizedResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(url, body)?;
        self.request(HttpMethod::Post, url, Some(body), options).await
    }

    pub async fn put<B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<NormalizedResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(url, body)?;
        self.request(HttpMethod::Put, url, Some(body), options).await
    }

    pub async fn patch<B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> ClientResult<NormalizedResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(url, body)?;
        self.request(HttpMethod::Patch, url, Some(body), options).await
    }

    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> ClientResult<NormalizedResponse> {
        self.request(HttpMethod::Delete, url, None, options).await
    }

    /// GET a list endpoint and decode its page envelope
    pub async fn get_paginated<T>(&self, url: &str, options: RequestOptions) -> ClientResult<Page<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.get(url, options).await?;
        Ok(response.json::<Page<T>>(url)?)
    }

    /// Issue one request through cache, breaker, retry and auth recovery
    ///
    /// Relative URLs are joined onto the configured base URL.
    #[instrument(skip(self, method, body, options), fields(method = %method))]
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ClientResult<NormalizedResponse> {
        let target = self.resolve(url, &options.query)?;
        let path = target.path().to_string();

        let cache_key = (method == HttpMethod::Get && !options.skip_cache)
            .then(|| cache_key_for(&target));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                debug!(%path, "Serving response from cache");
                return Ok(cached);
            }
        }

        let guarded = self.guarded(method, &target, body.as_ref(), &options.headers);
        let outcome = match options.timeout.or(self.config.request_timeout) {
            Some(timeout) => match tokio::time::timeout(timeout, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%path, ?timeout, "Request deadline elapsed");
                    return Err(ClientError::Timeout { timeout });
                }
            },
            None => guarded.await,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(ResilienceError::CircuitOpen) => {
                warn!(%path, "Request rejected, circuit breaker is open");
                return Err(ClientError::CircuitOpen);
            }
            Err(ResilienceError::OperationFailed { source }) => {
                let error = source.into_source().into_client_error(&path);
                warn!(%path, code = %error.code(), "Request failed");
                return Err(error);
            }
        };

        let normalized = NormalizedResponse {
            data: response.body,
            status: response.status,
            headers: response.headers,
        };

        if let Some(key) = cache_key {
            self.cache.set(&key, normalized.clone(), options.cache_ttl);
        } else if method.is_mutation() {
            self.invalidate_related(&target);
        }

        Ok(normalized)
    }

    fn resolve(&self, url: &str, query: &[(String, String)]) -> ClientResult<Url> {
        let absolute = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.as_str().trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        };

        let mut target = Url::parse(&absolute)
            .map_err(|error| ApiError::unknown(format!("Invalid request URL: {error}"), url))?;
        if !query.is_empty() {
            target.query_pairs_mut().extend_pairs(query);
        }
        Ok(target)
    }

    async fn guarded(
        &self,
        method: HttpMethod,
        target: &Url,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> ResilienceResult<TransportResponse, RetryError<AttemptError>> {
        // Auth recovery runs at most once per logical request, across retries
        let auth_used = AtomicBool::new(false);

        self.breaker
            .execute_classified(
                || self.retry.execute(|| self.attempt(method, target, body, headers, &auth_used)),
                |error: &RetryError<AttemptError>| error.source_ref().counts_as_failure(),
            )
            .await
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        target: &Url,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
        auth_used: &AtomicBool,
    ) -> Result<TransportResponse, AttemptError> {
        let credential = self.session.credential();

        let mut request = TransportRequest::new(method, target.as_str());
        request.headers.extend(headers.iter().map(|(name, value)| (name.clone(), value.clone())));
        request = request.with_header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if let Some(credential) = &credential {
            request = request.with_header(AUTHORIZATION_HEADER, credential.bearer());
        }
        if let Some(body) = body {
            request = request.with_body(body.clone());
        }

        let mut response = self.transport.send(request.clone()).await?;

        if response.status == 401 && !auth_used.swap(true, Ordering::SeqCst) {
            debug!(url = %target, "Received 401, recovering session");
            let sent_with = credential.as_ref().map(|credential| credential.access_token.as_str());
            response = self.auth.recover(request, sent_with).await?;
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(AttemptError::Status { response })
        }
    }

    /// Remove cached reads of the resource at `target`, its collection and
    /// anything below it
    fn invalidate_related(&self, target: &Url) {
        let path = target.path().trim_end_matches('/');
        let collection = path.rsplit_once('/').map_or("", |(parent, _)| parent);
        let origin = target.origin();

        let removed = self.cache.remove_where(|key| {
            let Some(cached) = key.strip_prefix("GET ").and_then(|raw| Url::parse(raw).ok())
            else {
                return false;
            };
            if cached.origin() != origin {
                return false;
            }
            let cached_path = cached.path().trim_end_matches('/');
            cached_path == path
                || (!collection.is_empty() && cached_path == collection)
                || cached_path.strip_prefix(path).is_some_and(|rest| rest.starts_with('/'))
        });

        if removed > 0 {
            debug!(path, removed, "Invalidated cached responses after write");
        }
    }
}

fn cache_key_for(target: &Url) -> String {
    format!("GET {target}")
}

fn encode_body<B>(url: &str, body: &B) -> ClientResult<Value>
where
    B: Serialize + ?Sized,
{
    serde_json::to_value(body).map_err(|error| {
        ApiError::unknown(format!("Failed to serialize request body: {error}"), url).into()
    })
}

fn config_error(error: ConfigError) -> ClinicDeskError {
    ClinicDeskError::Config(error.to_string())
}

/// Builder wiring ports into a [`ResilientClient`]
pub struct ResilientClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    session: Option<Arc<dyn SessionStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    hook: Arc<dyn SessionExpiredHook>,
    cache_tier: Option<Arc<dyn PersistentTier>>,
}

impl ResilientClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            session: None,
            refresher: None,
            hook: Arc::new(NoopSessionHook),
            cache_tier: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Called once each time the session is declared expired
    pub fn on_session_expired(mut self, hook: Arc<dyn SessionExpiredHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Mirror cached responses into a persistent tier
    pub fn cache_tier(mut self, tier: Arc<dyn PersistentTier>) -> Self {
        self.cache_tier = Some(tier);
        self
    }

    pub fn build(self) -> clinicdesk_domain::Result<ResilientClient> {
        let config = self.config;
        config.validate()?;

        let missing = |port: &str| ClinicDeskError::Config(format!("{port} is required"));
        let transport = self.transport.ok_or_else(|| missing("transport"))?;
        let session = self.session.ok_or_else(|| missing("session store"))?;
        let refresher = self.refresher.ok_or_else(|| missing("token refresher"))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|error| ClinicDeskError::Config(format!("Invalid base_url: {error}")))?;

        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::builder()
                .failure_threshold(config.failure_threshold)
                .reset_timeout(config.reset_timeout)
                .build()
                .map_err(config_error)?,
        )
        .map_err(config_error)?;

        let retry_config = RetryConfig::builder()
            .max_retries(config.max_retries)
            .exponential_backoff(config.base_delay, config.max_delay)
            .jitter(match config.jitter {
                JitterMode::None => Jitter::None,
                JitterMode::Full => Jitter::Full,
                JitterMode::Equal => Jitter::Equal,
            })
            .build()
            .map_err(config_error)?;
        let retry = RetryExecutor::new(retry_config, HttpRetryPolicy::new(config.max_delay));

        let cache_config = CacheConfig::fifo(config.cache_max_size, config.cache_ttl);
        let cache = match self.cache_tier {
            Some(tier) => TieredCache::persistent(cache_config, config.cache_namespace.clone(), tier),
            None => TieredCache::memory_only(cache_config, config.cache_namespace.clone()),
        };

        let auth = AuthRefreshCoordinator::new(
            Arc::clone(&transport),
            refresher,
            Arc::clone(&session),
            self.hook,
        );

        info!(
            base_url = %base_url,
            failure_threshold = config.failure_threshold,
            max_retries = config.max_retries,
            persistent_cache = cache.is_persistent(),
            "Resilient client ready"
        );

        Ok(ResilientClient { config, base_url, transport, session, breaker, retry, auth, cache })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for client::resilient.

    use async_trait::async_trait;
    use clinicdesk_domain::Credential;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::auth::RefreshError;
    use crate::client::TransportError;

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(
            &self,
            _request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::new(200, json!({})))
        }
    }

    #[derive(Default)]
    struct Session(Mutex<Option<Credential>>);

    impl SessionStore for Session {
        fn credential(&self) -> Option<Credential> {
            self.0.lock().clone()
        }
        fn set_credential(&self, credential: Credential) {
            *self.0.lock() = Some(credential);
        }
        fn clear_credential(&self) {
            *self.0.lock() = None;
        }
    }

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<Credential, RefreshError> {
            Err(RefreshError::MissingRefreshToken)
        }
    }

    fn client(base_url: &str) -> ResilientClient {
        ResilientClient::builder(ClientConfig::new(base_url))
            .transport(Arc::new(OkTransport))
            .session(Arc::new(Session::default()))
            .refresher(Arc::new(NoRefresh))
            .build()
            .expect("valid client")
    }

    #[test]
    fn test_relative_urls_join_onto_base() {
        let client = client("http://clinic.test/api/");

        let joined = client.resolve("/patients/7", &[]).expect("resolve");
        assert_eq!(joined.as_str(), "http://clinic.test/api/patients/7");

        let bare = client.resolve("doctors", &[]).expect("resolve");
        assert_eq!(bare.as_str(), "http://clinic.test/api/doctors");

        let absolute = client.resolve("https://other.test/x", &[]).expect("resolve");
        assert_eq!(absolute.as_str(), "https://other.test/x");
    }

    #[test]
    fn test_query_pairs_are_encoded() {
        let client = client("http://clinic.test/api");
        let query = vec![
            ("page".to_string(), "0".to_string()),
            ("search".to_string(), "ana maría".to_string()),
        ];

        let target = client.resolve("/patients", &query).expect("resolve");
        assert_eq!(target.path(), "/api/patients");
        assert_eq!(target.query(), Some("page=0&search=ana+mar%C3%ADa"));
    }

    #[test]
    fn test_invalidation_scope() {
        let client = client("http://clinic.test/api");
        let cached = |path: &str| {
            let target = client.resolve(path, &[]).expect("resolve");
            client.cache.set(&cache_key_for(&target), NormalizedResponse::new(200, json!(path)), None);
        };
        for path in ["/patients", "/patients/1", "/patients/1/visits", "/patients/12", "/doctors"] {
            cached(path);
        }

        let target = client.resolve("/patients/1", &[]).expect("resolve");
        client.invalidate_related(&target);

        let remaining = |path: &str| {
            let target = client.resolve(path, &[]).expect("resolve");
            client.cache.get(&cache_key_for(&target)).is_some()
        };
        assert!(!remaining("/patients"));
        assert!(!remaining("/patients/1"));
        assert!(!remaining("/patients/1/visits"));
        assert!(remaining("/patients/12"));
        assert!(remaining("/doctors"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let missing_transport = ResilientClient::builder(ClientConfig::default())
            .session(Arc::new(Session::default()))
            .refresher(Arc::new(NoRefresh))
            .build();
        assert_eq!(
            missing_transport.err(),
            Some(ClinicDeskError::Config("transport is required".to_string()))
        );

        let mut config = ClientConfig::default();
        config.failure_threshold = 0;
        let invalid = ResilientClient::builder(config)
            .transport(Arc::new(OkTransport))
            .session(Arc::new(Session::default()))
            .refresher(Arc::new(NoRefresh))
            .build();
        assert!(matches!(invalid, Err(ClinicDeskError::Config(_))));
    }
}
