//! Two-step circuit breaker.
//!
//! Admission and outcome reporting are separate steps: [`TwoStepCircuitBreaker::allow`] decides
//! whether a call may proceed and hands back an [`OutcomeRecorder`]; the caller runs the call and
//! reports the real result through [`OutcomeRecorder::record`].
//!
//! States:
//! - **Closed**: calls pass; counts accumulate. Trips to Open once `consecutive_failures`
//!   exceeds `failure_threshold`. With a non-zero `rolling_interval`, counts are cleared every
//!   interval.
//! - **Open**: calls are rejected until `open_timeout` has elapsed, then the breaker moves to
//!   Half-Open on the next look.
//! - **Half-Open**: at most `max_half_open_requests` probes are admitted. That many consecutive
//!   successes close the breaker; any failure reopens it.
//!
//! Every state change and every rolling-window reset starts a new generation. Outcomes recorded
//! against an older generation are ignored, so a slow call admitted before a trip cannot close or
//! re-trip the breaker afterwards.

use crate::clock::{Clock, MonotonicClock};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the open timeout elapses.
    Open,
    /// Probe mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Validated configuration shared by every breaker in a bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    max_half_open_requests: u32,
    rolling_interval: Duration,
    open_timeout: Duration,
    failure_threshold: u32,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerConfigError {
    #[error("max_half_open_requests must be > 0 (got {provided})")]
    InvalidHalfOpenLimit { provided: u32 },
    #[error("open_timeout must be > 0 (got {0:?})")]
    InvalidOpenTimeout(Duration),
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    ///
    /// `rolling_interval` of zero means counts are never cleared while Closed.
    pub fn new(
        max_half_open_requests: u32,
        rolling_interval: Duration,
        open_timeout: Duration,
        failure_threshold: u32,
    ) -> Result<Self, CircuitBreakerConfigError> {
        if max_half_open_requests == 0 {
            return Err(CircuitBreakerConfigError::InvalidHalfOpenLimit {
                provided: max_half_open_requests,
            });
        }
        if open_timeout.is_zero() {
            return Err(CircuitBreakerConfigError::InvalidOpenTimeout(open_timeout));
        }
        Ok(Self { max_half_open_requests, rolling_interval, open_timeout, failure_threshold })
    }

    /// A breaker that never trips.
    pub fn disabled() -> Self {
        Self {
            max_half_open_requests: u32::MAX,
            rolling_interval: Duration::ZERO,
            open_timeout: Duration::MAX,
            failure_threshold: u32::MAX,
        }
    }

    pub fn max_half_open_requests(&self) -> u32 {
        self.max_half_open_requests
    }

    pub fn rolling_interval(&self) -> Duration {
        self.rolling_interval
    }

    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// The breaker trips once consecutive failures exceed this value.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_half_open_requests: 1,
            rolling_interval: Duration::ZERO,
            open_timeout: Duration::from_secs(60),
            failure_threshold: 5,
        }
    }
}

/// Request and outcome counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Why a breaker refused admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("circuit breaker '{name}' is open (half-open probe in {remaining:?})")]
    Open { name: String, remaining: Duration },
    #[error("circuit breaker '{name}' is half-open and at its probe limit")]
    TooManyRequests { name: String },
}

impl AdmissionError {
    pub fn breaker_name(&self) -> &str {
        match self {
            AdmissionError::Open { name, .. } | AdmissionError::TooManyRequests { name } => name,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// Closed: end of the rolling window (`None` = never). Open: when probing may start.
    expiry_millis: Option<u64>,
}

/// Two-step circuit breaker for one gateway.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and affect the same
/// circuit lifecycle.
#[derive(Debug, Clone)]
pub struct TwoStepCircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<BreakerState>>,
}

impl TwoStepCircuitBreaker {
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(
        name: impl Into<Arc<str>>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let expiry_millis = add_millis(now, config.rolling_interval);
        Self {
            name: name.into(),
            config,
            clock,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry_millis,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask for admission. On success the returned recorder must be fed the call's outcome.
    pub fn allow(&self) -> Result<OutcomeRecorder, AdmissionError> {
        let now = self.clock.now_millis();
        let mut st = self.lock();
        self.refresh(&mut st, now);

        match st.state {
            CircuitState::Open => {
                let remaining = st
                    .expiry_millis
                    .map(|expiry| Duration::from_millis(expiry.saturating_sub(now)))
                    .unwrap_or(Duration::ZERO);
                tracing::warn!(
                    target: "paywire::circuit_breaker",
                    breaker = %self.name,
                    ?remaining,
                    "circuit open; request denied"
                );
                return Err(AdmissionError::Open { name: self.name.to_string(), remaining });
            }
            CircuitState::HalfOpen if st.counts.requests >= self.config.max_half_open_requests => {
                tracing::debug!(
                    target: "paywire::circuit_breaker",
                    breaker = %self.name,
                    in_flight = st.counts.requests,
                    "half-open probe limit reached; request denied"
                );
                return Err(AdmissionError::TooManyRequests { name: self.name.to_string() });
            }
            CircuitState::HalfOpen => {
                tracing::debug!(
                    target: "paywire::circuit_breaker",
                    breaker = %self.name,
                    probe = st.counts.requests + 1,
                    max = self.config.max_half_open_requests,
                    "half-open probe admitted"
                );
            }
            CircuitState::Closed => {}
        }

        st.counts.on_request();
        Ok(OutcomeRecorder { breaker: self.clone(), generation: st.generation, armed: true })
    }

    /// Current state, after applying any pending timeout or window expiry.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now_millis();
        let mut st = self.lock();
        self.refresh(&mut st, now);
        st.state
    }

    /// Counters of the current generation.
    pub fn counts(&self) -> Counts {
        let now = self.clock.now_millis();
        let mut st = self.lock();
        self.refresh(&mut st, now);
        st.counts
    }

    /// Force the breaker back to Closed with fresh counts.
    pub fn reset(&self) {
        let now = self.clock.now_millis();
        let mut st = self.lock();
        self.transition(&mut st, CircuitState::Closed, now);
        self.new_generation(&mut st, now);
    }

    fn record(&self, generation: u64, success: bool) {
        let now = self.clock.now_millis();
        let mut st = self.lock();
        self.refresh(&mut st, now);
        if st.generation != generation {
            tracing::trace!(
                target: "paywire::circuit_breaker",
                breaker = %self.name,
                stale = generation,
                current = st.generation,
                "ignoring outcome from a previous generation"
            );
            return;
        }

        if success {
            st.counts.on_success();
            if st.state == CircuitState::HalfOpen
                && st.counts.consecutive_successes >= self.config.max_half_open_requests
            {
                self.transition(&mut st, CircuitState::Closed, now);
            }
        } else {
            st.counts.on_failure();
            match st.state {
                CircuitState::Closed
                    if st.counts.consecutive_failures > self.config.failure_threshold =>
                {
                    self.transition(&mut st, CircuitState::Open, now);
                }
                CircuitState::HalfOpen => self.transition(&mut st, CircuitState::Open, now),
                _ => {}
            }
        }
    }

    /// Apply expiries that have come due: roll the Closed window, or let Open probe.
    fn refresh(&self, st: &mut BreakerState, now: u64) {
        let expired = st.expiry_millis.is_some_and(|expiry| expiry <= now);
        match st.state {
            CircuitState::Closed if expired => self.new_generation(st, now),
            CircuitState::Open if expired => self.transition(st, CircuitState::HalfOpen, now),
            _ => {}
        }
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState, now: u64) {
        if st.state == to {
            return;
        }
        let from = st.state;
        let failures = st.counts.consecutive_failures;
        st.state = to;
        self.new_generation(st, now);

        match to {
            CircuitState::Open => tracing::error!(
                target: "paywire::circuit_breaker",
                breaker = %self.name,
                %from,
                failures,
                threshold = self.config.failure_threshold,
                "circuit breaker → open"
            ),
            CircuitState::HalfOpen => tracing::info!(
                target: "paywire::circuit_breaker",
                breaker = %self.name,
                "circuit breaker → half-open"
            ),
            CircuitState::Closed => tracing::info!(
                target: "paywire::circuit_breaker",
                breaker = %self.name,
                %from,
                "circuit breaker → closed"
            ),
        }
    }

    fn new_generation(&self, st: &mut BreakerState, now: u64) {
        st.generation = st.generation.wrapping_add(1);
        st.counts = Counts::default();
        st.expiry_millis = match st.state {
            CircuitState::Closed => add_millis(now, self.config.rolling_interval),
            CircuitState::Open => Some(
                add_millis(now, self.config.open_timeout).unwrap_or(u64::MAX),
            ),
            CircuitState::HalfOpen => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Every update leaves the state internally consistent before anything can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `now + interval` in milliseconds; `None` for a zero interval, saturating on overflow.
fn add_millis(now: u64, interval: Duration) -> Option<u64> {
    if interval.is_zero() {
        return None;
    }
    let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    Some(now.saturating_add(millis))
}

/// Proof of admission; report the call's outcome through [`OutcomeRecorder::record`].
///
/// Dropping the recorder without recording counts as a failure, so a cancelled or panicking
/// call still releases its half-open probe slot and is accounted for.
#[must_use = "the outcome must be recorded, dropping it counts as a failure"]
#[derive(Debug)]
pub struct OutcomeRecorder {
    breaker: TwoStepCircuitBreaker,
    generation: u64,
    armed: bool,
}

impl OutcomeRecorder {
    pub fn record(mut self, success: bool) {
        self.armed = false;
        self.breaker.record(self.generation, success);
    }

    pub fn breaker_name(&self) -> &str {
        self.breaker.name()
    }
}

impl Drop for OutcomeRecorder {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                target: "paywire::circuit_breaker",
                breaker = %self.breaker.name,
                "outcome dropped unrecorded; counting as failure"
            );
            self.breaker.record(self.generation, false);
        }
    }
}
