//! Ledger Store
//!
//! Transactional, row-addressable storage for accounts and transaction
//! records. The transfer engine holds no in-process locks; all mutual
//! exclusion comes from the exclusive row holds a [`UnitOfWork`] acquires.
//!
//! Backends:
//! - [`postgres::PgLedgerStore`]: `SELECT ... FOR UPDATE` under READ COMMITTED
//! - [`memory::MemoryLedgerStore`]: in-process rows guarded by async mutexes

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::account::{Account, AccountId};
use crate::transfer::{TransactionId, TransactionRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    #[error("check constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("row hold not acquired within lock timeout")]
    LockTimeout,

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Isolation level requested for a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Sufficient when every balance read happens under an exclusive hold
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnitOfWorkOptions {
    pub isolation: IsolationLevel,
    /// Upper bound on waiting for any single row hold
    pub lock_timeout: Option<Duration>,
}

impl UnitOfWorkOptions {
    pub fn read_committed() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

/// Store-wide operations that run outside any larger unit of work
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a unit of work. Dropping it without commit rolls it back.
    async fn begin(&self, options: UnitOfWorkOptions) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Committed point read, no hold taken
    async fn fetch_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Sum of all committed balances
    async fn total_balance(&self) -> Result<Decimal, StoreError>;

    /// Insert a PENDING record. `Duplicate` if the id exists.
    async fn insert_record(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    async fn fetch_record(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// CAS PENDING -> FAILED. Returns false if the record was not PENDING.
    async fn fail_record_if_pending(
        &self,
        transaction_id: TransactionId,
        reason: &str,
    ) -> Result<bool, StoreError>;

    /// PENDING records last touched before `cutoff`, oldest first
    async fn find_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One atomic unit of work: reads and writes commit or roll back together.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquire the exclusive hold on an account row and read it.
    ///
    /// Blocks while another unit of work holds the row. Returns `None` when
    /// the row does not exist; the id stays reserved for this unit of work
    /// where the backend supports it.
    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn insert_account(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<Account, StoreError>;

    /// Write a balance for a row held by this unit of work
    async fn update_balance(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError>;

    /// CAS PENDING -> COMPLETED inside this unit of work.
    /// Returns false if the record was not PENDING.
    async fn complete_record_if_pending(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_sql() {
        assert_eq!(IsolationLevel::default().as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn test_options_builder() {
        let opts = UnitOfWorkOptions::read_committed().with_lock_timeout(Duration::from_secs(2));
        assert_eq!(opts.isolation, IsolationLevel::ReadCommitted);
        assert_eq!(opts.lock_timeout, Some(Duration::from_secs(2)));
    }
}
