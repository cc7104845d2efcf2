//! Account management module
//!
//! Accounts are created once with an opening balance and never deleted.
//! Balances change only through the transfer engine.

pub mod models;
pub mod repository;

pub use models::{Account, AccountId};
pub use repository::AccountRepository;
