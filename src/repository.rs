//! Persistence port for routed transactions, plus an in-memory adapter.
//!
//! Records are keyed by `(gateway, gateway_ref_id)`: a reference id is only unique within the
//! gateway that issued it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::gateway::{TransactionKind, TransactionRequest, TransactionStatus};

/// A transaction as stored after a gateway accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub description: String,
    pub customer_id: String,
    pub preferred_gateway: String,
    pub metadata: serde_json::Value,
    pub gateway: String,
    pub gateway_ref_id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// A new `pending` record for `request`, served by `gateway` under `gateway_ref_id`.
    pub fn pending(
        request: &TransactionRequest,
        gateway: impl Into<String>,
        gateway_ref_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: request.kind,
            amount: request.amount.round_dp(2),
            currency: request.currency.clone(),
            payment_method: request.payment_method.clone(),
            description: request.description.clone(),
            customer_id: request.customer_id.clone(),
            preferred_gateway: request.preferred_gateway.clone(),
            metadata: request.metadata.clone(),
            gateway: gateway.into(),
            gateway_ref_id: gateway_ref_id.into(),
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("transaction {gateway}/{ref_id} not found")]
    NotFound { gateway: String, ref_id: String },
    #[error("transaction {gateway}/{ref_id} already exists")]
    Duplicate { gateway: String, ref_id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage for transaction records.
#[async_trait]
pub trait TransactionRepository: Send + Sync + std::fmt::Debug {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Duplicate`] when the gateway reference is already stored.
    async fn create_transaction(&self, record: TransactionRecord) -> Result<(), RepositoryError>;

    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no record matches.
    async fn get_transaction_by_gateway_ref(
        &self,
        gateway: &str,
        ref_id: &str,
    ) -> Result<TransactionRecord, RepositoryError>;

    /// Sets the status and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no record matches.
    async fn update_transaction_status(
        &self,
        gateway: &str,
        ref_id: &str,
        status: TransactionStatus,
    ) -> Result<(), RepositoryError>;
}

type RecordKey = (String, String);

/// Thread-safe in-memory repository; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionRepository {
    records: Arc<RwLock<HashMap<RecordKey, TransactionRecord>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn key(gateway: &str, ref_id: &str) -> RecordKey {
    (gateway.to_string(), ref_id.to_string())
}

fn not_found(gateway: &str, ref_id: &str) -> RepositoryError {
    RepositoryError::NotFound { gateway: gateway.to_string(), ref_id: ref_id.to_string() }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create_transaction(&self, record: TransactionRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let key = key(&record.gateway, &record.gateway_ref_id);
        if records.contains_key(&key) {
            return Err(RepositoryError::Duplicate { gateway: key.0, ref_id: key.1 });
        }
        records.insert(key, record);
        Ok(())
    }

    async fn get_transaction_by_gateway_ref(
        &self,
        gateway: &str,
        ref_id: &str,
    ) -> Result<TransactionRecord, RepositoryError> {
        self.records
            .read()
            .await
            .get(&key(gateway, ref_id))
            .cloned()
            .ok_or_else(|| not_found(gateway, ref_id))
    }

    async fn update_transaction_status(
        &self,
        gateway: &str,
        ref_id: &str,
        status: TransactionStatus,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&key(gateway, ref_id)).ok_or_else(|| not_found(gateway, ref_id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(gateway: &str, ref_id: &str) -> TransactionRecord {
        let request = TransactionRequest::deposit(dec!(19.999), "USD");
        TransactionRecord::pending(&request, gateway, ref_id, Utc::now())
    }

    #[tokio::test]
    async fn create_then_get() {
        let repo = InMemoryTransactionRepository::new();
        repo.create_transaction(record("A", "r1")).await.unwrap();

        let stored = repo.get_transaction_by_gateway_ref("A", "r1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.amount, dec!(20.00));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn ref_ids_are_scoped_per_gateway() {
        let repo = InMemoryTransactionRepository::new();
        repo.create_transaction(record("A", "r1")).await.unwrap();
        repo.create_transaction(record("B", "r1")).await.unwrap();

        let err = repo.create_transaction(record("A", "r1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate { .. }));
        assert!(matches!(
            repo.get_transaction_by_gateway_ref("C", "r1").await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_status_touches_updated_at() {
        let repo = InMemoryTransactionRepository::new();
        let original = record("A", "r1");
        let created_at = original.created_at;
        repo.create_transaction(original).await.unwrap();

        repo.update_transaction_status("A", "r1", TransactionStatus::Success).await.unwrap();
        let stored = repo.get_transaction_by_gateway_ref("A", "r1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert!(stored.updated_at >= created_at);

        let err = repo
            .update_transaction_status("A", "missing", TransactionStatus::Failed)
            .await
            .unwrap_err();
        assert_eq!(err, RepositoryError::NotFound { gateway: "A".into(), ref_id: "missing".into() });
    }
}
