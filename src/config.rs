//! Construction-time configuration for the dispatch engine.
//!
//! Durations are plain millisecond integers. Nothing here is re-read after
//! [`DispatchConfig::build`]; changing gateways means building a new [`Router`].
//!
//! ```json
//! {
//!   "gateways": [
//!     { "name": "Gateway-A", "protocol": "json_http", "target": "https://a.example/pay",
//!       "retry": { "max_retries": 3,
//!                  "backoff": { "initial_interval_ms": 1000, "multiplier": 1.2, "max_interval_ms": 2000 } } },
//!     { "name": "Gateway-B", "protocol": "simulated_xml" }
//!   ],
//!   "circuit_breaker": { "failure_threshold": 1, "open_timeout_ms": 300000 }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::{BackoffError, ExponentialBackoff};
use crate::breaker_bank::CircuitBreakerBank;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerConfigError};
use crate::gateway::{Gateway, JsonHttpGateway, JsonTcpGateway, RetryConfig, XmlHttpGateway};
use crate::jitter::Jitter;
use crate::registry::{Registry, RegistryError};
use crate::router::Router;
use crate::transport::{SimulatedFormat, SimulatedSender, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration document")]
    Parse(#[from] serde_json::Error),
    #[error("gateway #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("gateway '{0}' is configured more than once")]
    DuplicateGateway(String),
    #[error("gateway '{gateway}' needs a target for protocol {protocol:?}")]
    MissingTarget { gateway: String, protocol: Protocol },
    #[error("gateway '{gateway}' has a zero timeout")]
    ZeroTimeout { gateway: String },
    #[error("gateway '{gateway}' has an invalid backoff")]
    Backoff {
        gateway: String,
        #[source]
        source: BackoffError,
    },
    #[error("invalid circuit breaker settings")]
    CircuitBreaker(#[from] CircuitBreakerConfigError),
    #[error("gateway '{gateway}' transport could not be created")]
    Transport {
        gateway: String,
        #[source]
        source: TransportError,
    },
    #[error("gateway registration failed")]
    Registry(#[from] RegistryError),
}

/// Wire encoding and transport of one gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    JsonHttp,
    XmlHttp,
    JsonTcp,
    /// JSON gateway answered locally by a [`SimulatedSender`].
    SimulatedJson,
    /// XML gateway answered locally by a [`SimulatedSender`].
    SimulatedXml,
}

impl Protocol {
    fn needs_target(self) -> bool {
        matches!(self, Protocol::JsonHttp | Protocol::XmlHttp | Protocol::JsonTcp)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSettings {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self { initial_interval_ms: 1_000, multiplier: 2.0, max_interval_ms: 10_000 }
    }
}

impl BackoffSettings {
    pub fn build(&self) -> Result<ExponentialBackoff, BackoffError> {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_interval_ms),
            self.multiplier,
            Duration::from_millis(self.max_interval_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff: BackoffSettings,
    pub jitter: Jitter,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, backoff: BackoffSettings::default(), jitter: Jitter::None }
    }
}

impl RetrySettings {
    pub fn build(&self) -> Result<RetryConfig, BackoffError> {
        Ok(RetryConfig::new(self.max_retries, self.backoff.build()?).with_jitter(self.jitter))
    }
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySettings {
    pub name: String,
    pub protocol: Protocol,
    /// URL for HTTP protocols, `host:port` for TCP; unused by simulated gateways.
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl GatewaySettings {
    /// Construct the gateway variant selected by `protocol`.
    pub fn build(&self) -> Result<Arc<dyn Gateway>, ConfigError> {
        let retry = self
            .retry
            .build()
            .map_err(|source| ConfigError::Backoff { gateway: self.name.clone(), source })?;
        let timeout = Duration::from_millis(self.timeout_ms);
        let transport_err =
            |source| ConfigError::Transport { gateway: self.name.clone(), source };

        let gateway: Arc<dyn Gateway> = match self.protocol {
            Protocol::JsonHttp => Arc::new(
                JsonHttpGateway::http(&self.name, &self.method, &self.target, timeout, retry)
                    .map_err(transport_err)?,
            ),
            Protocol::XmlHttp => Arc::new(
                XmlHttpGateway::http(&self.name, &self.method, &self.target, timeout, retry)
                    .map_err(transport_err)?,
            ),
            Protocol::JsonTcp => {
                Arc::new(JsonTcpGateway::tcp(&self.name, &self.target, timeout, retry))
            }
            Protocol::SimulatedJson => Arc::new(JsonHttpGateway::new(
                &self.name,
                SimulatedSender::new(SimulatedFormat::Json),
                retry,
            )),
            Protocol::SimulatedXml => Arc::new(XmlHttpGateway::new(
                &self.name,
                SimulatedSender::new(SimulatedFormat::Xml),
                retry,
            )),
        };
        Ok(gateway)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    pub max_half_open_requests: u32,
    /// 0 keeps counts until the next state change.
    pub rolling_interval_ms: u64,
    pub open_timeout_ms: u64,
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            max_half_open_requests: defaults.max_half_open_requests(),
            rolling_interval_ms: 0,
            open_timeout_ms: 60_000,
            failure_threshold: defaults.failure_threshold(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn build(&self) -> Result<CircuitBreakerConfig, CircuitBreakerConfigError> {
        CircuitBreakerConfig::new(
            self.max_half_open_requests,
            Duration::from_millis(self.rolling_interval_ms),
            Duration::from_millis(self.open_timeout_ms),
            self.failure_threshold,
        )
    }
}

/// Gateways in registration order plus the breaker settings shared by all of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    pub gateways: Vec<GatewaySettings>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl DispatchConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for (index, gateway) in self.gateways.iter().enumerate() {
            if gateway.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(gateway.name.as_str()) {
                return Err(ConfigError::DuplicateGateway(gateway.name.clone()));
            }
            if gateway.protocol.needs_target() && gateway.target.trim().is_empty() {
                return Err(ConfigError::MissingTarget {
                    gateway: gateway.name.clone(),
                    protocol: gateway.protocol,
                });
            }
            if gateway.timeout_ms == 0 {
                return Err(ConfigError::ZeroTimeout { gateway: gateway.name.clone() });
            }
            gateway
                .retry
                .backoff
                .build()
                .map_err(|source| ConfigError::Backoff { gateway: gateway.name.clone(), source })?;
        }
        self.circuit_breaker.build()?;
        Ok(())
    }

    /// Build every gateway, register them in declared order, and hand back a router with a
    /// fresh breaker bank.
    pub fn build(&self) -> Result<Router, ConfigError> {
        self.validate()?;
        let router = Router::new(
            Arc::new(Registry::new()),
            CircuitBreakerBank::new(self.circuit_breaker.build()?),
        );
        for settings in &self.gateways {
            router.register(settings.build()?)?;
        }
        tracing::info!(
            target: "paywire::config",
            gateways = self.gateways.len(),
            "dispatch engine configured"
        );
        Ok(router)
    }
}
