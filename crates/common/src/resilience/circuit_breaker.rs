//! Circuit breaker guarding a remote backend against cascading failures
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast without running
//! - Half-Open: exactly one probe call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      consecutive_failures >= failure_threshold
//! Open      → Half-Open: first call after reset_timeout has elapsed
//! Half-Open → Closed:    probe succeeds
//! Half-Open → Open:      probe fails (cooldown restarts)
//! ```
//!
//! All state lives behind one synchronous lock that is never held across an
//! `.await`, so every check-then-transition is atomic with respect to other
//! callers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Circuit breakers and caches read time through this trait so tests can
/// drive cooldowns and expirations without real delays.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can keep one handle and
/// advance the clock seen by the component under test.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Error Types
//==============================================================================

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced by a guarded operation
///
/// Generic over the operation's own error type `E`, which is preserved
/// unchanged in [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a single probe
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(30) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Circuit breaker metrics snapshot for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

#[derive(Debug)]
struct BreakerStats {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    total_calls: u64,
    rejected_calls: u64,
    state_changed_at: Instant,
}

impl BreakerStats {
    fn transition(&mut self, next: CircuitState, now: Instant) {
        if self.state != next {
            self.state = next;
            self.state_changed_at = now;
        }
    }
}

/// How a call was let through; decides which transitions its outcome drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Releases the half-open probe slot if the guarded future is dropped
/// before it settles.
struct ProbeSlot<'a> {
    stats: &'a Mutex<BreakerStats>,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut stats = self.stats.lock();
            stats.probe_in_flight = false;
            debug!("Circuit breaker probe abandoned before completion");
        }
    }
}

/// Circuit breaker over async operations
///
/// Clones share state, so one breaker can be handed to every request path
/// that talks to the same backend.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    stats: Arc<Mutex<BreakerStats>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &stats.state)
            .field("consecutive_failures", &stats.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let now = clock.now();
        Ok(Self {
            config,
            stats: Arc::new(Mutex::new(BreakerStats {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                probe_in_flight: false,
                total_calls: 0,
                rejected_calls: 0,
                state_changed_at: now,
            })),
            clock: Arc::new(clock),
        })
    }

    /// Configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation, counting every error as a backend failure
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.execute_classified(operation, |_| true).await
    }

    /// Execute an operation, letting `is_failure` decide which errors count
    /// against the breaker
    ///
    /// Errors for which `is_failure` returns `false` mean the backend
    /// answered; they are recorded as a success and still returned to the
    /// caller inside [`ResilienceError::OperationFailed`].
    #[instrument(skip_all, fields(state = %self.state()))]
    pub async fn execute_classified<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: FnOnce(&E) -> bool,
    {
        let Some(admission) = self.try_admit() else {
            debug!("Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        };

        let mut slot = ProbeSlot { stats: &self.stats, armed: admission == Admission::Probe };
        let result = operation().await;
        slot.armed = false;

        match result {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(error) => {
                if is_failure(&error) {
                    self.on_failure(admission);
                    warn!(error = %error, "Circuit breaker: operation failed");
                } else {
                    self.on_success(admission);
                    debug!(error = %error, "Circuit breaker: error not counted as failure");
                }
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Decide whether a call may run, performing the Open → Half-Open
    /// transition when the cooldown has elapsed
    fn try_admit(&self) -> Option<Admission> {
        let now = self.clock.now();
        let mut stats = self.stats.lock();

        let admission = match stats.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let cooled_down = stats.last_failure.map_or(true, |failed_at| {
                    now.saturating_duration_since(failed_at) > self.config.reset_timeout
                });
                if cooled_down {
                    stats.transition(CircuitState::HalfOpen, now);
                    stats.probe_in_flight = true;
                    info!("Circuit breaker half-open, letting one probe through");
                    Some(Admission::Probe)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if stats.probe_in_flight {
                    None
                } else {
                    stats.probe_in_flight = true;
                    Some(Admission::Probe)
                }
            }
        };

        match admission {
            Some(_) => stats.total_calls += 1,
            None => stats.rejected_calls += 1,
        }
        admission
    }

    fn on_success(&self, admission: Admission) {
        let now = self.clock.now();
        let mut stats = self.stats.lock();
        stats.consecutive_failures = 0;

        if admission == Admission::Probe {
            stats.probe_in_flight = false;
            stats.last_failure = None;
            stats.transition(CircuitState::Closed, now);
            info!("Circuit breaker closed after successful probe");
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = self.clock.now();
        let mut stats = self.stats.lock();
        stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);

        match (admission, stats.state) {
            (Admission::Probe, _) => {
                stats.probe_in_flight = false;
                stats.last_failure = Some(now);
                stats.transition(CircuitState::Open, now);
                warn!("Circuit breaker re-opened after failed probe");
            }
            (Admission::Normal, CircuitState::Closed) => {
                stats.last_failure = Some(now);
                if stats.consecutive_failures >= self.config.failure_threshold {
                    stats.transition(CircuitState::Open, now);
                    warn!(
                        failures = stats.consecutive_failures,
                        "Circuit breaker opened after consecutive failures"
                    );
                }
            }
            (Admission::Normal, CircuitState::Open) => {
                stats.last_failure = Some(now);
            }
            // A straggler admitted before the circuit opened; the probe decides
            (Admission::Normal, CircuitState::HalfOpen) => {}
        }
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.stats.lock().state
    }

    /// Whether a call issued now would be admitted, without transitioning
    pub fn is_available(&self) -> bool {
        let stats = self.stats.lock();
        match stats.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !stats.probe_in_flight,
            CircuitState::Open => stats.last_failure.map_or(true, |failed_at| {
                self.clock.now().saturating_duration_since(failed_at) > self.config.reset_timeout
            }),
        }
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let stats = self.stats.lock();
        CircuitBreakerMetrics {
            state: stats.state,
            consecutive_failures: stats.consecutive_failures,
            total_calls: stats.total_calls,
            rejected_calls: stats.rejected_calls,
            last_failure_time: stats.last_failure,
            state_change_time: stats.state_changed_at,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut stats = self.stats.lock();
        stats.consecutive_failures = 0;
        stats.last_failure = None;
        stats.probe_in_flight = false;
        stats.transition(CircuitState::Closed, now);
        info!("Circuit breaker manually reset to closed state");
    }
}
