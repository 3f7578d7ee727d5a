use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Gateway, GatewayCore, GatewayError, RetryConfig, TransactionRequest, TransactionResponse,
    TransactionStatus,
};
use crate::codec::JsonCodec;
use crate::context::DispatchContext;
use crate::sleeper::Sleeper;
use crate::transport::{HttpSender, Sender, TransportError};

#[derive(Debug, Serialize)]
struct JsonPaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct JsonPaymentResponse {
    ref_id: String,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
}

/// Gateway speaking JSON over HTTP: `{"amount", "currency"}` in,
/// `{"ref_id", "status", "created_at"}` out.
#[derive(Debug)]
pub struct JsonHttpGateway {
    core: GatewayCore<JsonPaymentRequest, JsonPaymentResponse>,
}

impl JsonHttpGateway {
    /// JSON gateway over an arbitrary sender.
    pub fn new<S>(name: impl Into<String>, sender: S, retry: RetryConfig) -> Self
    where
        S: Sender + 'static,
    {
        Self { core: GatewayCore::new(name, retry).with_serializer(JsonCodec).with_sender(sender) }
    }

    /// JSON gateway posting to `url` with its own HTTP client.
    pub fn http(
        name: impl Into<String>,
        method: &str,
        url: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, TransportError> {
        let sender = HttpSender::new(method, url, timeout)?.with_content_type("application/json");
        Ok(Self::new(name, sender, retry))
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.core = self.core.with_sleeper(sleeper);
        self
    }
}

#[async_trait]
impl Gateway for JsonHttpGateway {
    fn name(&self) -> &str {
        self.core.name()
    }

    async fn transact(
        &self,
        ctx: &DispatchContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, GatewayError> {
        let wire = JsonPaymentRequest { amount: request.amount, currency: request.currency.clone() };
        let reply = self.core.send_with_retry(ctx, &wire).await?;
        Ok(TransactionResponse {
            gateway: self.name().to_string(),
            ref_id: reply.ref_id,
            status: reply.status,
            created_at: reply.created_at,
        })
    }
}
