//! One circuit breaker per gateway name, created on first use.
//!
//! The bank keeps its breakers in a [`Registry`], so inspection follows the order in which
//! gateways were first consulted. Creation goes through [`Registry::get_or_insert_with`]: two
//! flows hitting a brand-new gateway at once end up sharing one breaker.

use std::sync::Arc;

use crate::circuit_breaker::{
    AdmissionError, CircuitBreakerConfig, CircuitState, Counts, OutcomeRecorder,
    TwoStepCircuitBreaker,
};
use crate::clock::{Clock, MonotonicClock};
use crate::registry::{Registry, RegistryError};

/// Lazily populated set of per-gateway breakers sharing one configuration.
#[derive(Debug)]
pub struct CircuitBreakerBank {
    breakers: Registry<TwoStepCircuitBreaker>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreakerBank {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerBank {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    /// Bank whose breakers read time from `clock` (tests pass a `ManualClock`).
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { breakers: Registry::new(), config, clock }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admission check for `gateway`. The recorder must receive the real outcome of the call.
    pub fn allow(&self, gateway: &str) -> Result<OutcomeRecorder, AdmissionError> {
        self.breaker(gateway).allow()
    }

    /// The breaker for `gateway`, creating it if this is the first time the name is seen.
    pub fn breaker(&self, gateway: &str) -> TwoStepCircuitBreaker {
        self.breakers.get_or_insert_with(gateway, || {
            tracing::debug!(
                target: "paywire::breaker_bank",
                gateway,
                "creating circuit breaker"
            );
            TwoStepCircuitBreaker::with_clock(gateway, self.config.clone(), self.clock.clone())
        })
    }

    /// State of an existing breaker; `None` if the gateway was never consulted.
    pub fn state(&self, gateway: &str) -> Option<CircuitState> {
        self.breakers.get(gateway).ok().map(|b| b.state())
    }

    pub fn counts(&self, gateway: &str) -> Option<Counts> {
        self.breakers.get(gateway).ok().map(|b| b.counts())
    }

    /// `(gateway, state)` for every breaker, in creation order.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        self.breakers.entries().into_iter().map(|(name, b)| (name, b.state())).collect()
    }

    pub fn reset(&self, gateway: &str) -> Result<(), RegistryError> {
        let breaker = self.breakers.get(gateway)?;
        breaker.reset();
        tracing::info!(target: "paywire::breaker_bank", gateway, "circuit breaker reset");
        Ok(())
    }

    /// Drop the breaker for `gateway`; the next `allow` starts from a fresh Closed breaker.
    pub fn remove(&self, gateway: &str) -> Result<(), RegistryError> {
        self.breakers.unregister(gateway).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
