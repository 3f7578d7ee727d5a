#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # paywire
//!
//! Payment gateway dispatch: send each transaction to one of several interchangeable gateways
//! and keep succeeding while individual gateways are slow, erroring, or down.
//!
//! ## Pieces
//!
//! - **Backoff** strategies mapping a retry attempt to a wait ([`backoff`])
//! - **Ordered registry** of named values with preferred-first listing ([`registry`])
//! - **Two-step circuit breakers**, one per gateway, created on first use ([`breaker_bank`])
//! - **Gateway core** with serialization, transport and bounded, cancellable retries ([`gateway`])
//! - **Router** that tries gateways in preference order behind their breakers ([`router`])
//!
//! Around the engine: JSON/XML codecs, HTTP/TCP senders, a transaction repository port and a
//! payment service that routes and then persists.
//!
//! ## Quick Start
//!
//! ```rust
//! use paywire::prelude::*;
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = DispatchConfig::from_json_str(
//!         r#"{ "gateways": [
//!               { "name": "Gateway-A", "protocol": "simulated_json" },
//!               { "name": "Gateway-B", "protocol": "simulated_xml" } ] }"#,
//!     )
//!     .and_then(|config| config.build())
//!     .expect("valid config");
//!
//!     let ctx = DispatchContext::background();
//!     let request = TransactionRequest::deposit(Decimal::new(1050, 2), "USD")
//!         .with_preferred_gateway("Gateway-B");
//!     let routed = router
//!         .send_message(&ctx, &request.preferred_gateway, |gateway| {
//!             let (ctx, request) = (&ctx, &request);
//!             async move { gateway.transact(ctx, request).await }
//!         })
//!         .await
//!         .expect("a gateway accepted the deposit");
//!     assert_eq!(routed.gateway_name, "Gateway-B");
//! }
//! ```

pub mod backoff;
pub mod breaker_bank;
pub mod circuit_breaker;
pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod gateway;
pub mod jitter;
pub mod prelude;
pub mod registry;
pub mod repository;
pub mod router;
pub mod service;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use backoff::{BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff};
pub use breaker_bank::CircuitBreakerBank;
pub use circuit_breaker::{
    AdmissionError, CircuitBreakerConfig, CircuitBreakerConfigError, CircuitState, Counts,
    OutcomeRecorder, TwoStepCircuitBreaker,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use codec::{CodecError, JsonCodec, Serializer, XmlCodec};
pub use config::{ConfigError, DispatchConfig};
pub use context::{CancelReason, DispatchContext};
pub use gateway::{Gateway, GatewayCore, GatewayError, RetryConfig};
pub use jitter::Jitter;
pub use registry::{Registry, RegistryError};
pub use repository::{InMemoryTransactionRepository, TransactionRepository};
pub use router::{Router, RouterError, RouterResponse};
pub use service::{PaymentService, ServiceError};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{Sender, TransportError};
