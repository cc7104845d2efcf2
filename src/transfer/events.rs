//! Transfer lifecycle events
//!
//! The engine reports outcomes through an injected sink rather than a
//! process-wide logger. [`TracingEvents`] is the default and writes
//! structured `tracing` events into the current transfer span.

use std::time::Duration;
use tracing::{info, warn};

use super::types::{TransactionId, TransactionRecord};
use crate::error::LedgerError;

pub trait TransferEvents: Send + Sync {
    /// PENDING record persisted, before any hold is taken
    fn record_created(&self, record: &TransactionRecord);

    /// Unit of work committed
    fn completed(&self, record: &TransactionRecord, elapsed: Duration);

    /// Business rule rejected the transfer; record moved to FAILED
    fn rejected(&self, transaction_id: TransactionId, error: &LedgerError);

    /// Store-level failure; record left PENDING
    fn unavailable(&self, transaction_id: TransactionId, error: &LedgerError);

    /// Sweeper gave up on a stale PENDING record
    fn abandoned(&self, record: &TransactionRecord);
}

/// Default sink: structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl TransferEvents for TracingEvents {
    fn record_created(&self, record: &TransactionRecord) {
        tracing::debug!(
            transaction_id = %record.transaction_id,
            source = %record.source,
            destination = %record.destination,
            amount = %record.amount,
            "Transaction record created"
        );
    }

    fn completed(&self, record: &TransactionRecord, elapsed: Duration) {
        info!(
            transaction_id = %record.transaction_id,
            source = %record.source,
            destination = %record.destination,
            amount = %record.amount,
            elapsed_us = elapsed.as_micros() as u64,
            "Transfer completed"
        );
    }

    fn rejected(&self, transaction_id: TransactionId, error: &LedgerError) {
        info!(
            transaction_id = %transaction_id,
            code = error.code(),
            error = %error,
            "Transfer rejected"
        );
    }

    fn unavailable(&self, transaction_id: TransactionId, error: &LedgerError) {
        warn!(
            transaction_id = %transaction_id,
            error = %error,
            "Transfer unavailable, record left pending"
        );
    }

    fn abandoned(&self, record: &TransactionRecord) {
        warn!(
            transaction_id = %record.transaction_id,
            pending_since = %record.updated_at,
            "Stale pending transaction abandoned"
        );
    }
}
