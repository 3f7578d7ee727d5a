//! Payment orchestration on top of the router: route, then persist.

use std::sync::Arc;

use chrono::Utc;

use crate::context::{CancelReason, DispatchContext};
use crate::gateway::{TransactionRequest, TransactionResponse, UpdateStatusRequest};
use crate::repository::{RepositoryError, TransactionRecord, TransactionRepository};
use crate::router::{Router, RouterError, RouterResponse};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No gateway could take the transaction; callers should answer "service unavailable".
    /// The router error keeps the last gateway failure for diagnostics.
    #[error("all payment gateways are currently unavailable")]
    Unavailable(#[source] RouterError),
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("transaction with ref_id {ref_id} not found at gateway {gateway}")]
    TransactionNotFound { gateway: String, ref_id: String },
    #[error("transaction storage failed")]
    Persistence(#[source] RepositoryError),
}

impl From<RouterError> for ServiceError {
    fn from(err: RouterError) -> Self {
        match err.cancel_reason() {
            Some(reason) => ServiceError::Cancelled(reason),
            None => ServiceError::Unavailable(err),
        }
    }
}

/// Routes transactions through the [`Router`] and records accepted ones.
#[derive(Debug, Clone)]
pub struct PaymentService {
    router: Arc<Router>,
    repository: Arc<dyn TransactionRepository>,
}

impl PaymentService {
    pub fn new(router: Arc<Router>, repository: Arc<dyn TransactionRepository>) -> Self {
        Self { router, repository }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Send `request` to a gateway (preferring `request.preferred_gateway`) and store the
    /// accepted transaction as `pending`.
    pub async fn create_transaction(
        &self,
        ctx: &DispatchContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, ServiceError> {
        let routed = self
            .router
            .send_message(ctx, &request.preferred_gateway, |gateway| async move {
                gateway.transact(ctx, request).await
            })
            .await;

        let RouterResponse { gateway_name, payload } = match routed {
            Ok(routed) => routed,
            Err(err) => {
                tracing::warn!(target: "paywire::service", error = %err, "transaction not routed");
                return Err(err.into());
            }
        };
        tracing::info!(
            target: "paywire::service",
            gateway = %gateway_name,
            ref_id = %payload.ref_id,
            status = %payload.status,
            "received response from gateway"
        );

        let record =
            TransactionRecord::pending(request, gateway_name.as_str(), payload.ref_id.as_str(), Utc::now());
        self.repository.create_transaction(record).await.map_err(ServiceError::Persistence)?;

        Ok(TransactionResponse { gateway: gateway_name, ..payload })
    }

    /// Apply a gateway's status callback to the stored transaction.
    pub async fn update_status(
        &self,
        ctx: &DispatchContext,
        request: &UpdateStatusRequest,
    ) -> Result<(), ServiceError> {
        if let Some(reason) = ctx.err() {
            return Err(ServiceError::Cancelled(reason));
        }
        tracing::info!(
            target: "paywire::service",
            gateway = %request.gateway,
            ref_id = %request.ref_id,
            status = %request.status,
            "updating transaction status"
        );

        self.repository
            .get_transaction_by_gateway_ref(&request.gateway, &request.ref_id)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound { gateway, ref_id } => {
                    ServiceError::TransactionNotFound { gateway, ref_id }
                }
                other => ServiceError::Persistence(other),
            })?;

        self.repository
            .update_transaction_status(&request.gateway, &request.ref_id, request.status)
            .await
            .map_err(ServiceError::Persistence)
    }
}
