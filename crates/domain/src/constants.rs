//! Application constants
//!
//! Centralized location for the client's defaults and wire names.

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

// Retry
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

// Cache
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;
pub const DEFAULT_CACHE_NAMESPACE: &str = "clinicdesk";

// Authentication
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

// Headers
pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
pub const BEARER_PREFIX: &str = "Bearer ";

// Error codes that are not HTTP statuses
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";
pub const HTTP_ERROR_CODE_PREFIX: &str = "HTTP_";
