//! Ledger schema
//!
//! Idempotent DDL applied at startup. Balances and amounts are
//! `NUMERIC(20, 8)`: 12 integer digits, 8 fractional.

use sqlx::PgPool;

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL UNIQUE CHECK (account_id > 0),
    balance     NUMERIC(20, 8) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id                      BIGSERIAL PRIMARY KEY,
    transaction_id          UUID NOT NULL UNIQUE,
    source_account_id       BIGINT NOT NULL,
    destination_account_id  BIGINT NOT NULL,
    amount                  NUMERIC(20, 8) NOT NULL CHECK (amount > 0),
    status                  VARCHAR(20) NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'completed', 'failed')),
    error_message           TEXT,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (source_account_id <> destination_account_id)
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions (source_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_destination ON transactions (destination_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_status_updated ON transactions (status, updated_at)",
];

/// Serializes concurrent migrators (several instances starting at once)
const MIGRATION_LOCK_KEY: i64 = 0x7472_616e_7366;

/// Create tables and indexes if they do not exist.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Applying ledger schema...");

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    sqlx::query(CREATE_ACCOUNTS_TABLE).execute(&mut *tx).await?;
    sqlx::query(CREATE_TRANSACTIONS_TABLE)
        .execute(&mut *tx)
        .await?;
    for ddl in CREATE_INDEXES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!("Ledger schema ready");
    Ok(())
}
