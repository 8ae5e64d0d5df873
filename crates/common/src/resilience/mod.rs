//! Resilience patterns for fault tolerance and error handling
//!
//! - **Circuit Breaker**: stops calling a dependency after repeated failures
//!   and admits a single probe once the reset timeout has elapsed
//! - **Retry Logic**: sequential retries with capped exponential backoff and
//!   optional jitter
//!
//! Both are generic over the error type. The breaker takes a classification
//! predicate so callers decide which errors count as dependency failures; the
//! retry executor takes a [`RetryPolicy`] for the same purpose.

pub mod circuit_breaker;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, ConfigError, ConfigResult, MockClock, ResilienceError, ResilienceResult,
    SystemClock,
};
// Re-export retry types
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryContext,
    RetryDecision, RetryError, RetryExecutor, RetryPolicy, RetryResult,
};
