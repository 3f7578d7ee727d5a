//! Convenient re-exports for common paywire types.
pub use crate::{
    backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff},
    breaker_bank::CircuitBreakerBank,
    circuit_breaker::{CircuitBreakerConfig, CircuitState},
    config::DispatchConfig,
    context::{CancelReason, DispatchContext},
    gateway::{
        Gateway, GatewayError, JsonHttpGateway, JsonTcpGateway, RetryConfig, TransactionKind,
        TransactionRequest, TransactionResponse, TransactionStatus, UpdateStatusRequest,
        XmlHttpGateway,
    },
    jitter::Jitter,
    registry::Registry,
    repository::{InMemoryTransactionRepository, TransactionRepository},
    router::{Router, RouterError, RouterResponse},
    service::{PaymentService, ServiceError},
    transport::{HttpSender, SimulatedFormat, SimulatedSender, TcpSender},
};
