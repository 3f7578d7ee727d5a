//! Gateway abstraction and its concrete variants.
//!
//! A [`Gateway`] turns a [`TransactionRequest`] into a [`TransactionResponse`]. Variants differ
//! only in their wire shapes, encoding and transport; all of them delegate the actual exchange
//! to a [`GatewayCore`].

mod base;
mod error;
mod json_http;
mod json_tcp;
pub mod models;
mod xml_http;

pub use base::{GatewayCore, RetryConfig, UNNAMED_GATEWAY};
pub use error::GatewayError;
pub use json_http::JsonHttpGateway;
pub use json_tcp::JsonTcpGateway;
pub use models::{
    TransactionKind, TransactionRequest, TransactionResponse, TransactionStatus,
    UpdateStatusRequest,
};
pub use xml_http::XmlHttpGateway;

use async_trait::async_trait;

use crate::context::DispatchContext;

/// A downstream payment gateway.
#[async_trait]
pub trait Gateway: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn transact(
        &self,
        ctx: &DispatchContext,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, GatewayError>;
}
