//! HTTP handlers
//!
//! Every handler returns `Result<_, LedgerError>`; the error's
//! `IntoResponse` picks the status and the `{code, error, message}` body.

pub mod account;
pub mod health;
pub mod transaction;

pub use account::{create_account, get_account};
pub use health::health_check;
pub use transaction::{create_transaction, get_transaction};
