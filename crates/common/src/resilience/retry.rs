//! Retry executor with exponential backoff
//!
//! The executor runs an operation, asks a [`RetryPolicy`] whether each error
//! is worth another attempt, and sleeps between attempts according to the
//! configured [`BackoffStrategy`] and [`Jitter`]. Attempts are strictly
//! sequential: attempt N+1 never starts before attempt N has settled.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    #[error("All retry attempts exhausted after {attempts} tries")]
    AttemptsExhausted { attempts: u32, source: E },

    /// The operation failed with an error the policy refused to retry
    #[error("Operation failed with non-retryable error")]
    NonRetryable { source: E },
}

impl<E> RetryError<E> {
    /// The error from the final attempt
    pub fn into_source(self) -> E {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => source,
        }
    }

    /// Borrow the error from the final attempt
    pub fn source_ref(&self) -> &E {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => source,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Classify the error from attempt `attempt` (0-based)
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the default backoff delay
    Retry,
    /// Retry the operation with a custom delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// `min(base_delay * 2^attempt, max_delay)`
    Exponential { base_delay: Duration, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before the retry that follows attempt `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { base_delay, max_delay } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base_delay.checked_mul(factor).map_or(*max_delay, |delay| delay.min(*max_delay))
            }
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// No jitter: delays are exactly the backoff value
    #[default]
    None,
    /// Full jitter: uniform in `0..=delay`
    Full,
    /// Equal jitter: uniform in `delay/2..=delay`
    Equal,
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                base_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(10_000),
            },
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let BackoffStrategy::Exponential { base_delay, max_delay } = &self.backoff {
            if base_delay > max_delay {
                return Err(ConfigError::Invalid {
                    message: "base_delay must not exceed max_delay".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Backoff delay after attempt `attempt`, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.calculate_delay(attempt)
    }

    /// Backoff delay after attempt `attempt`, with jitter applied
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.delay_for(attempt))
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { base_delay, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-request retry state; lives exactly as long as one `execute` call
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (0-based)
    pub attempt: u32,
    /// Allowed attempts (first try plus retries)
    pub max_attempts: u32,
    /// Start time of retry sequence
    pub start_time: Instant,
    /// Total accumulated delay across attempts
    pub total_delay: Duration,
}

impl RetryContext {
    fn new(max_attempts: u32) -> Self {
        Self { attempt: 0, max_attempts, start_time: Instant::now(), total_delay: Duration::ZERO }
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Create with default configuration
    pub fn with_policy(policy: P) -> Self {
        Self::new(RetryConfig::default(), policy)
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether the error from attempt `attempt` earns another attempt:
    /// retries remain and the policy classifies it as retryable
    pub fn should_retry<E>(&self, error: &E, attempt: u32) -> bool
    where
        P: RetryPolicy<E>,
    {
        attempt < self.config.max_retries
            && self.policy.should_retry(error, attempt) != RetryDecision::Stop
    }

    /// Execute an operation with retry logic
    #[instrument(skip_all, fields(max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut context = RetryContext::new(self.config.max_retries.saturating_add(1));

        loop {
            let attempt_number = context.attempt + 1;
            debug!("Executing operation (attempt {}/{})", attempt_number, context.max_attempts);

            let error = match operation().await {
                Ok(value) => {
                    if context.attempt > 0 {
                        debug!(
                            retries = context.attempt,
                            total_delay = ?context.total_delay,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, context.attempt) {
                RetryDecision::Stop => {
                    debug!("Retry policy determined not to retry: {:?}", error);
                    return Err(RetryError::NonRetryable { source: error });
                }
                _ if context.attempt >= self.config.max_retries => {
                    warn!(
                        "All retry attempts exhausted after {} tries, last error: {:?}",
                        attempt_number, error
                    );
                    return Err(RetryError::AttemptsExhausted {
                        attempts: attempt_number,
                        source: error,
                    });
                }
                RetryDecision::Retry => self.config.jittered_delay_for(context.attempt),
                RetryDecision::RetryAfter(custom_delay) => custom_delay,
            };

            warn!(
                attempt = attempt_number,
                ?delay,
                error = ?error,
                elapsed = ?context.start_time.elapsed(),
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            context.total_delay += delay;
            context.attempt += 1;
        }
    }
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Predicate-based retry policy
    #[derive(Debug)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
