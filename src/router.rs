//! Gateway selection and fallback.
//!
//! [`Router::send_message`] walks the candidates from
//! [`Registry::list_with_preference`] strictly in order, one at a time:
//! - a candidate whose circuit breaker refuses admission is skipped;
//! - an admitted candidate runs the caller's operation, and the outcome is reported to its
//!   breaker;
//! - the first success is returned, tagged with the gateway's name;
//! - any failure moves on to the next candidate.
//!
//! The router never retries the same gateway; that happens inside the gateway's own retry loop.
//! The context is checked before each candidate and after each failure, so a cancelled
//! transaction ends with [`RouterError::Cancelled`] instead of falling back.

use std::future::Future;
use std::sync::Arc;

use crate::breaker_bank::CircuitBreakerBank;
use crate::context::{CancelReason, DispatchContext};
use crate::gateway::{Gateway, GatewayError};
use crate::registry::{Registry, RegistryError};

/// Successful routing result.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterResponse<T> {
    /// Name of the gateway that served the request.
    pub gateway_name: String,
    pub payload: T,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no gateways registered")]
    NoGatewaysRegistered,
    #[error("routing stopped: {0}")]
    Cancelled(CancelReason),
    /// Every candidate either failed or was refused by its breaker. `last` is the error of the
    /// last gateway actually tried, `None` if none was admitted.
    #[error("all gateways failed ({tried} tried, {skipped} rejected by circuit breaker)")]
    AllGatewaysFailed {
        tried: usize,
        skipped: usize,
        #[source]
        last: Option<GatewayError>,
    },
}

impl RouterError {
    /// True when routing ran out of gateways: none registered, or every candidate failed or
    /// was refused by its breaker. Cancellation is not unavailability.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RouterError::NoGatewaysRegistered | RouterError::AllGatewaysFailed { .. })
    }

    /// Error of the last gateway actually tried.
    pub fn last_error(&self) -> Option<&GatewayError> {
        match self {
            RouterError::AllGatewaysFailed { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            RouterError::Cancelled(reason) => Some(*reason),
            RouterError::AllGatewaysFailed { last: Some(err), .. } => err.cancel_reason(),
            _ => None,
        }
    }
}

/// Routes operations to registered gateways behind per-gateway circuit breakers.
#[derive(Debug)]
pub struct Router {
    gateways: Arc<Registry<Arc<dyn Gateway>>>,
    breakers: CircuitBreakerBank,
}

impl Router {
    pub fn new(gateways: Arc<Registry<Arc<dyn Gateway>>>, breakers: CircuitBreakerBank) -> Self {
        Self { gateways, breakers }
    }

    /// Register `gateway` under its own name, after every existing gateway.
    pub fn register(&self, gateway: Arc<dyn Gateway>) -> Result<(), RegistryError> {
        let name = gateway.name().to_string();
        self.gateways.register(name.clone(), gateway)?;
        tracing::info!(target: "paywire::router", gateway = %name, "gateway registered");
        Ok(())
    }

    pub fn gateways(&self) -> &Registry<Arc<dyn Gateway>> {
        &self.gateways
    }

    pub fn breakers(&self) -> &CircuitBreakerBank {
        &self.breakers
    }

    /// Run `operation` against the preferred gateway, falling back through the rest in
    /// registration order until one succeeds.
    pub async fn send_message<T, F, Fut>(
        &self,
        ctx: &DispatchContext,
        preferred: &str,
        mut operation: F,
    ) -> Result<RouterResponse<T>, RouterError>
    where
        F: FnMut(Arc<dyn Gateway>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let candidates = self.gateways.list_with_preference(preferred);
        if candidates.is_empty() {
            return Err(RouterError::NoGatewaysRegistered);
        }

        let mut tried = 0;
        let mut skipped = 0;
        let mut last = None;

        for gateway in candidates {
            if let Some(reason) = ctx.err() {
                tracing::warn!(target: "paywire::router", %reason, tried, "routing stopped");
                return Err(RouterError::Cancelled(reason));
            }

            let name = gateway.name().to_string();
            let recorder = match self.breakers.allow(&name) {
                Ok(recorder) => recorder,
                Err(denied) => {
                    tracing::warn!(
                        target: "paywire::router",
                        gateway = %name,
                        reason = %denied,
                        "skipping gateway"
                    );
                    skipped += 1;
                    continue;
                }
            };

            tried += 1;
            tracing::info!(target: "paywire::router", gateway = %name, "sending to gateway");
            match operation(Arc::clone(&gateway)).await {
                Ok(payload) => {
                    recorder.record(true);
                    return Ok(RouterResponse { gateway_name: name, payload });
                }
                Err(err) => {
                    recorder.record(false);
                    tracing::warn!(
                        target: "paywire::router",
                        gateway = %name,
                        error = %err,
                        unavailable = err.is_unavailable(),
                        "gateway failed; trying next"
                    );
                    last = Some(err);
                }
            }

            if let Some(reason) = ctx.err() {
                tracing::warn!(target: "paywire::router", %reason, tried, "routing stopped");
                return Err(RouterError::Cancelled(reason));
            }
        }

        tracing::error!(target: "paywire::router", tried, skipped, "all gateways failed");
        Err(RouterError::AllGatewaysFailed { tried, skipped, last })
    }
}
