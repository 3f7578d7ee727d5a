//! Transaction value types exchanged between callers, the router and the gateways.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

/// Lifecycle status reported by a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A payment to route. `preferred_gateway` may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
    pub customer_id: String,
    #[serde(default)]
    pub preferred_gateway: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TransactionRequest {
    /// Deposit with the remaining fields left empty.
    pub fn deposit(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            amount,
            currency: currency.into(),
            payment_method: String::new(),
            description: String::new(),
            customer_id: String::new(),
            preferred_gateway: String::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_preferred_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.preferred_gateway = gateway.into();
        self
    }
}

/// What a gateway returned for an accepted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub gateway: String,
    pub ref_id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Status callback from a gateway about an earlier transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub gateway: String,
    pub ref_id: String,
    pub status: TransactionStatus,
}
