//! Wire round trips: bytes in, bytes out.
//!
//! A [`Sender`] knows nothing about encodings. It moves one encoded request to a gateway and
//! returns the raw reply. Every sender races its I/O against the [`DispatchContext`], so a
//! cancelled transaction never leaves a request running in the background.

mod http;
mod simulated;
mod tcp;

pub use http::HttpSender;
pub use simulated::{SimulatedFormat, SimulatedSender};
pub use tcp::{TcpSender, MAX_TCP_RESPONSE};

use std::time::Duration;

use async_trait::async_trait;

use crate::context::{CancelReason, DispatchContext};

/// Failure of a wire round trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The gateway cannot serve requests right now; worth retrying later.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Cancelled(CancelReason),
    #[error("unexpected HTTP status code: {0}")]
    Status(u16),
    #[error("invalid HTTP request: {0}")]
    InvalidRequest(String),
    #[error("HTTP request failed")]
    Http(#[source] reqwest::Error),
    #[error("TCP {stage} failed")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed by remote host")]
    ConnectionClosed,
    #[error("response exceeds {0} bytes")]
    ResponseTooLarge(usize),
    #[error("failed to encode simulated response: {0}")]
    Simulation(String),
}

impl TransportError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            TransportError::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// One request/response exchange with a gateway.
#[async_trait]
pub trait Sender: Send + Sync + std::fmt::Debug {
    async fn send(&self, ctx: &DispatchContext, payload: &[u8]) -> Result<Vec<u8>, TransportError>;
}
