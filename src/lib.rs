//! Funds Ledger - accounts with exact decimal balances and atomic transfers
//!
//! # Modules
//!
//! - [`money`] - Decimal parsing at ledger scale (8 fractional digits)
//! - [`account`] - Account model and repository
//! - [`transfer`] - Transfer engine, transaction records, stale sweeper
//! - [`store`] - Ledger store seam with PostgreSQL and in-process backends
//! - [`db`] - PostgreSQL pool and schema
//! - [`gateway`] - HTTP API (axum)
//! - [`config`] / [`logging`] - Ambient setup for the binary

pub mod account;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod money;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountId, AccountRepository};
pub use error::LedgerError;
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore, StoreError};
pub use transfer::{
    TransactionId, TransactionRecord, TransactionStatus, TransferEngine, TransferRequest,
};
