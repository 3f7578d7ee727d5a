use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Gateway, GatewayCore, GatewayError, RetryConfig, TransactionKind, TransactionRequest,
    TransactionResponse, TransactionStatus,
};
use crate::codec::JsonCodec;
use crate::context::DispatchContext;
use crate::sleeper::Sleeper;
use crate::transport::{Sender, TcpSender};

#[derive(Debug, Serialize)]
struct TcpPaymentMessage {
    #[serde(rename = "type")]
    kind: TransactionKind,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: String,
    customer_id: String,
}

#[derive(Debug, Deserialize)]
struct TcpPaymentReply {
    ref_id: String,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
}

/// Gateway exchanging one JSON message per raw TCP connection.
#[derive(Debug)]
pub struct JsonTcpGateway {
    core: GatewayCore<TcpPaymentMessage, TcpPaymentReply>,
}

impl JsonTcpGateway {
    pub fn new<S>(name: impl Into<String>, sender: S, retry: RetryConfig) -> Self
    where
        S: Sender + 'static,
    {
        Self { core: GatewayCore::new(name, retry).with_serializer(JsonCodec).with_sender(sender) }
    }

    /// Connects to `address` for every attempt; `timeout` bounds each connect, write and read.
    pub fn tcp(
        name: impl Into<String>,
        address: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self::new(name, TcpSender::new(address, timeout), retry)
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
impl Gateway for JsonTcpGateway {
    fn name(&self) -> &str {
        self.core.name()
    }

    async fn transact(
        &self,
        ctx: &DispatchContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, GatewayError> {
        let message = TcpPaymentMessage {
            kind: request.kind,
            amount: request.amount,
            currency: request.currency.clone(),
            customer_id: request.customer_id.clone(),
        };
        let reply = self.core.send_with_retry(ctx, &message).await?;
        Ok(TransactionResponse {
            gateway: self.name().to_string(),
            ref_id: reply.ref_id,
            status: reply.status,
            created_at: reply.created_at,
        })
    }
}
