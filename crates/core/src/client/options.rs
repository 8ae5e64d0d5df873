//! Per-request options

use std::collections::BTreeMap;
use std::time::Duration;

/// Optional knobs for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Query parameters appended to the URL, in order
    pub query: Vec<(String, String)>,
    /// Extra headers; `Authorization` and `X-Request-Id` are set by the client
    pub headers: BTreeMap<String, String>,
    /// Deadline for the whole request, retries included
    pub timeout: Option<Duration>,
    /// Bypass the response cache for this GET
    pub skip_cache: bool,
    /// TTL for the cached response instead of the configured one
    pub cache_ttl: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// `page` and `size` parameters for a paginated list endpoint
    pub fn page(self, number: u32, size: u32) -> Self {
        self.query("page", number).query("size", size)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}
