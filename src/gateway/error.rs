use crate::codec::CodecError;
use crate::context::CancelReason;
use crate::transport::TransportError;

/// Why a gateway call failed. Each variant names the stage that failed and keeps the cause as
/// its source.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required collaborator (`"serializer"` or `"sender"`) was never set.
    #[error("{0} is not initialized")]
    Unconfigured(&'static str),
    #[error("error marshaling data")]
    Serialization(#[source] CodecError),
    #[error("error sending data")]
    Transport(#[source] TransportError),
    #[error("received empty response")]
    EmptyResponse,
    #[error("error unmarshaling response")]
    Deserialization(#[source] CodecError),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled or timed out: {0}")]
    Cancelled(CancelReason),
    #[error("max retries reached after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// True if this error, or any error it wraps, signals an unavailable gateway.
    pub fn is_unavailable(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Transport(err) => err.is_unavailable(),
            GatewayError::MaxRetriesExceeded { last, .. } => last.is_unavailable(),
            _ => false,
        }
    }

    /// The cancellation behind this error, if any.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            GatewayError::Cancelled(reason) => Some(*reason),
            GatewayError::Transport(err) => err.cancel_reason(),
            GatewayError::MaxRetriesExceeded { last, .. } => last.cancel_reason(),
            _ => None,
        }
    }

    /// Errors that will fail the same way on every attempt.
    pub(crate) fn is_permanent(&self) -> bool {
        matches!(self, GatewayError::Unconfigured(_) | GatewayError::Serialization(_))
    }
}
