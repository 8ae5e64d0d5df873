//! Client configuration
//!
//! One `ClientConfig` is built per client instance and validated before the
//! client is constructed. Durations serialize as milliseconds.

use std::path::PathBuf;
use std::time::Duration;

use clinicdesk_common::{duration_millis, option_duration_millis};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{ClinicDeskError, Result};
use crate::impl_wire_name_conversions;

/// Randomization applied on top of the retry backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    #[default]
    None,
    Full,
    Equal,
}

impl_wire_name_conversions!(JitterMode {
    None => "none",
    Full => "full",
    Equal => "equal",
});

/// Settings for one resilient API client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Absolute `http(s)` URL relative request paths are joined onto
    pub base_url: String,

    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    #[serde(with = "duration_millis")]
    pub reset_timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub jitter: JitterMode,

    #[serde(with = "duration_millis")]
    pub cache_ttl: Duration,
    pub cache_max_size: usize,
    pub cache_namespace: String,
    /// SQLite file backing the persistent cache tier; memory only when unset
    pub cache_path: Option<PathBuf>,

    pub refresh_path: String,

    /// Default deadline for a whole request, retries included
    #[serde(with = "option_duration_millis")]
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_millis(DEFAULT_RESET_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: JitterMode::None,
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            cache_path: None,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(ClinicDeskError::Config(message.to_string()));

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return invalid("base_url must be an absolute http(s) URL");
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold must be at least 1");
        }
        if self.base_delay > self.max_delay {
            return invalid("base_delay must not exceed max_delay");
        }
        if self.cache_ttl.is_zero() {
            return invalid("cache_ttl must be greater than zero");
        }
        if self.cache_max_size == 0 {
            return invalid("cache_max_size must be at least 1");
        }
        if self.cache_namespace.trim().is_empty() {
            return invalid("cache_namespace must not be empty");
        }
        if !self.refresh_path.starts_with('/') {
            return invalid("refresh_path must start with '/'");
        }
        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return invalid("request_timeout must be greater than zero");
        }

        Ok(())
    }

    /// Absolute URL of the token refresh endpoint
    pub fn refresh_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.refresh_path)
    }
}
