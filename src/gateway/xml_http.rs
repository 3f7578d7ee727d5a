use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Gateway, GatewayCore, GatewayError, RetryConfig, TransactionRequest, TransactionResponse,
    TransactionStatus,
};
use crate::codec::{CodecError, XmlCodec};
use crate::context::DispatchContext;
use crate::sleeper::Sleeper;
use crate::transport::{HttpSender, Sender, TransportError};

#[derive(Debug, Serialize)]
#[serde(rename = "PaymentRequest")]
struct XmlPaymentRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    amount: Decimal,
    currency: String,
}

// Status stays textual on the wire; it is parsed after decoding.
#[derive(Debug, Deserialize)]
struct XmlPaymentResponse {
    ref_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

/// Gateway speaking XML over HTTP: `<PaymentRequest>` in, a document with `ref_id`, `status`
/// and `created_at` children out.
#[derive(Debug)]
pub struct XmlHttpGateway {
    core: GatewayCore<XmlPaymentRequest, XmlPaymentResponse>,
}

impl XmlHttpGateway {
    pub fn new<S>(name: impl Into<String>, sender: S, retry: RetryConfig) -> Self
    where
        S: Sender + 'static,
    {
        Self { core: GatewayCore::new(name, retry).with_serializer(XmlCodec).with_sender(sender) }
    }

    pub fn http(
        name: impl Into<String>,
        method: &str,
        url: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, TransportError> {
        let sender = HttpSender::new(method, url, timeout)?.with_content_type("application/xml");
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
impl Gateway for XmlHttpGateway {
    fn name(&self) -> &str {
        self.core.name()
    }

    async fn transact(
        &self,
        ctx: &DispatchContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, GatewayError> {
        let wire = XmlPaymentRequest {
            kind: request.kind.as_str(),
            amount: request.amount,
            currency: request.currency.clone(),
        };
        let reply = self.core.send_with_retry(ctx, &wire).await?;
        let status = reply.status.parse::<TransactionStatus>().map_err(|e| {
            GatewayError::Deserialization(CodecError::Decode { format: "xml", source: Box::new(e) })
        })?;
        Ok(TransactionResponse {
            gateway: self.name().to_string(),
            ref_id: reply.ref_id,
            status,
            created_at: reply.created_at,
        })
    }
}
