use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Sender, TransportError};
use crate::context::DispatchContext;

/// Largest reply accepted from a gateway in one round trip.
pub const MAX_TCP_RESPONSE: usize = 4096;

/// Opens a fresh connection per request, writes the payload and reads the reply until the peer
/// closes the connection.
///
/// A reply may arrive in any number of segments; it ends at EOF. The read timeout applies to
/// each read, so a peer that answers and then holds the connection open times out. Replies over
/// [`MAX_TCP_RESPONSE`] bytes fail with [`TransportError::ResponseTooLarge`].
///
/// A refused connection maps to [`TransportError::Unavailable`]; a peer that closes without
/// answering maps to [`TransportError::ConnectionClosed`].
#[derive(Debug, Clone)]
pub struct TcpSender {
    address: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpSender {
    /// `timeout` applies separately to connect, write and read.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self { address: address.into(), connect_timeout: timeout, io_timeout: timeout }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn round_trip(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|source| match source.kind() {
                ErrorKind::ConnectionRefused => {
                    TransportError::Unavailable(format!("{} refused the connection", self.address))
                }
                _ => TransportError::Io { stage: "connect", source },
            })?;

        timeout(self.io_timeout, stream.write_all(payload))
            .await
            .map_err(|_| TransportError::Timeout(self.io_timeout))?
            .map_err(|source| TransportError::Io { stage: "write", source })?;

        let mut reply = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = timeout(self.io_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout(self.io_timeout))?
                .map_err(|source| TransportError::Io { stage: "read", source })?;
            if read == 0 {
                break;
            }
            if reply.len() + read > MAX_TCP_RESPONSE {
                return Err(TransportError::ResponseTooLarge(MAX_TCP_RESPONSE));
            }
            reply.extend_from_slice(&chunk[..read]);
        }
        if reply.is_empty() {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(reply)
    }
}

#[async_trait]
impl Sender for TcpSender {
    async fn send(&self, ctx: &DispatchContext, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        tracing::trace!(
            target: "paywire::transport",
            address = %self.address,
            bytes = payload.len(),
            "tcp send"
        );
        ctx.run(self.round_trip(payload)).await.map_err(TransportError::Cancelled)?
    }
}
