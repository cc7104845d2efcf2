//! Transaction Record Store
//!
//! Records are written PENDING before any balance moves. Every later status
//! change is a compare-and-set from PENDING:
//! - `mark_completed` runs inside the transfer's own unit of work
//! - `mark_failed` runs standalone, after the unit of work is gone

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::types::{TransactionId, TransactionRecord, ValidatedTransfer};
use crate::error::LedgerError;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

#[derive(Clone)]
pub struct TransactionRecordStore {
    store: Arc<dyn LedgerStore>,
}

impl TransactionRecordStore {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Insert a PENDING record. `Conflict` if the id was already used.
    pub async fn create_record(
        &self,
        transaction_id: TransactionId,
        transfer: &ValidatedTransfer,
    ) -> Result<TransactionRecord, LedgerError> {
        let record = TransactionRecord::pending(transaction_id, transfer);
        self.store
            .insert_record(&record)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => LedgerError::Conflict(transaction_id),
                other => other.into(),
            })?;
        Ok(record)
    }

    /// PENDING -> COMPLETED inside `uow`. False means the record had
    /// already left PENDING and nothing was written.
    pub async fn mark_completed(
        &self,
        uow: &mut dyn UnitOfWork,
        transaction_id: TransactionId,
    ) -> Result<bool, LedgerError> {
        Ok(uow.complete_record_if_pending(transaction_id).await?)
    }

    /// PENDING -> FAILED with a reason. False if not PENDING.
    pub async fn mark_failed(
        &self,
        transaction_id: TransactionId,
        reason: &str,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .fail_record_if_pending(transaction_id, reason)
            .await?)
    }

    pub async fn get(&self, transaction_id: TransactionId) -> Result<TransactionRecord, LedgerError> {
        self.store
            .fetch_record(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    /// PENDING records untouched for at least `older_than`, oldest first
    pub async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| LedgerError::InvalidInput(format!("stale age out of range: {}", e)))?;
        Ok(self
            .store
            .find_pending_before(Utc::now() - age, limit)
            .await?)
    }
}
