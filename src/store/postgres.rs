//! PostgreSQL Ledger Store
//!
//! Row holds are `SELECT ... FOR UPDATE` inside a READ COMMITTED
//! transaction. `lock_timeout` is applied per transaction with `SET LOCAL`,
//! so a blocked hold surfaces as SQLSTATE 55P03 instead of waiting forever.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{LedgerStore, StoreError, UnitOfWork, UnitOfWorkOptions};
use crate::account::{Account, AccountId};
use crate::transfer::{TransactionId, TransactionRecord, TransactionStatus};

const ACCOUNT_COLUMNS: &str = "account_id, balance, created_at, updated_at";
const RECORD_COLUMNS: &str = "transaction_id, source_account_id, destination_account_id, amount, \
                              status, error_message, created_at, updated_at";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                Some("23505") => return StoreError::Duplicate(db.message().to_string()),
                Some("23514") => return StoreError::ConstraintViolation(db.message().to_string()),
                Some("55P03") => return StoreError::LockTimeout,
                _ => {}
            }
        }
        StoreError::Unavailable(e.to_string())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let raw_id: i64 = row.try_get("account_id")?;
    let account_id = AccountId::new(raw_id)
        .map_err(|_| StoreError::Corrupt(format!("account_id {}", raw_id)))?;

    Ok(Account {
        account_id,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord, StoreError> {
    let account = |column: &str| -> Result<AccountId, StoreError> {
        let raw: i64 = row.try_get(column)?;
        AccountId::new(raw).map_err(|_| StoreError::Corrupt(format!("{} {}", column, raw)))
    };

    let status: String = row.try_get("status")?;
    let status = status.parse::<TransactionStatus>().map_err(StoreError::Corrupt)?;

    Ok(TransactionRecord {
        transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
        source: account("source_account_id")?,
        destination: account("destination_account_id")?,
        amount: row.try_get("amount")?,
        status,
        error: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self, options: UnitOfWorkOptions) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            options.isolation.as_sql()
        ))
        .execute(&mut *tx)
        .await?;

        if let Some(timeout) = options.lock_timeout {
            // SET does not take bind parameters; the value is an integer.
            sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis().max(1)))
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn fetch_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn total_balance(&self) -> Result<Decimal, StoreError> {
        let total = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(balance), 0)::NUMERIC(30, 8) FROM accounts",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn insert_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (transaction_id, source_account_id, destination_account_id, amount, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.transaction_id.inner())
        .bind(record.source.get())
        .bind(record.destination.get())
        .bind(record.amount)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_record(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1",
            RECORD_COLUMNS
        ))
        .bind(transaction_id.inner())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn fail_record_if_pending(
        &self,
        transaction_id: TransactionId,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, error_message = $2, updated_at = NOW()
            WHERE transaction_id = $3 AND status = $4
            "#,
        )
        .bind(TransactionStatus::Failed.as_str())
        .bind(reason)
        .bind(transaction_id.inner())
        .bind(TransactionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions \
             WHERE status = $1 AND updated_at <= $2 \
             ORDER BY updated_at ASC LIMIT $3",
            RECORD_COLUMNS
        ))
        .bind(TransactionStatus::Pending.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO accounts (account_id, balance) VALUES ($1, $2) RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id.get())
        .bind(balance)
        .fetch_one(&mut *self.tx)
        .await?;

        account_from_row(&row)
    }

    async fn update_balance(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = $1, updated_at = NOW() WHERE account_id = $2",
        )
        .bind(balance)
        .bind(account_id.get())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!(
                "update of missing account {}",
                account_id
            )));
        }
        Ok(())
    }

    async fn complete_record_if_pending(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, updated_at = NOW()
            WHERE transaction_id = $2 AND status = $3
            "#,
        )
        .bind(TransactionStatus::Completed.as_str())
        .bind(transaction_id.inner())
        .bind(TransactionStatus::Pending.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
