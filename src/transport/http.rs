use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};

use super::{Sender, TransportError};
use crate::context::DispatchContext;

/// Sends each payload as the body of one HTTP request.
///
/// 502, 503 and 504 map to [`TransportError::Unavailable`], as do connection failures. Any other
/// non-2xx status is [`TransportError::Status`].
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    method: Method,
    url: String,
    timeout: Duration,
    content_type: Option<&'static str>,
}

impl HttpSender {
    /// Build a sender with its own client; `timeout` bounds each whole request.
    pub fn new(method: &str, url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Self::with_client(client, method, url, timeout)
    }

    /// Reuse an existing client (and its connection pool).
    pub fn with_client(
        client: Client,
        method: &str,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("invalid method '{method}'")))?;
        Ok(Self { client, method, url: url.into(), timeout, content_type: None })
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn round_trip(&self, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.request(self.method.clone(), &self.url).body(payload);
        if let Some(content_type) = self.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => {
                    TransportError::Unavailable(format!("{} returned {status}", self.url))
                }
                other => TransportError::Status(other.as_u16()),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(body.to_vec())
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::Unavailable(format!("cannot connect to {}", self.url))
        } else {
            TransportError::Http(err)
        }
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, ctx: &DispatchContext, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        tracing::trace!(
            target: "paywire::transport",
            method = %self.method,
            url = %self.url,
            bytes = payload.len(),
            "http send"
        );
        ctx.run(self.round_trip(payload.to_vec())).await.map_err(TransportError::Cancelled)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_normalised() {
        let sender =
            HttpSender::new("post", "http://127.0.0.1:1/pay", Duration::from_secs(1)).unwrap();
        assert_eq!(sender.method, Method::POST);
        assert_eq!(sender.url(), "http://127.0.0.1:1/pay");
    }

    #[test]
    fn invalid_method_is_rejected() {
        let err = HttpSender::new("NOT A METHOD", "http://x", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn cancelled_context_skips_the_request() {
        let sender =
            HttpSender::new("POST", "http://127.0.0.1:9/pay", Duration::from_secs(1)).unwrap();
        let ctx = DispatchContext::background();
        ctx.cancel();
        let err = sender.send(&ctx, b"{}").await.unwrap_err();
        assert_eq!(err.cancel_reason(), Some(crate::context::CancelReason::Cancelled));
    }
}
