//! Ledger Error Types
//!
//! One caller-facing taxonomy shared by the account repository, the
//! transaction record store and the transfer engine. Every variant maps to a
//! stable machine-readable code and an HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::account::AccountId;
use crate::money::MoneyError;
use crate::store::StoreError;
use crate::transfer::TransactionId;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Rejected before touching the store ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Lookup ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    // === Identifier collisions ===
    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    #[error("Transaction id already recorded: {0}")]
    Conflict(TransactionId),

    // === Business rules ===
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Destination balance would exceed the ledger maximum")]
    BalanceOverflow,

    // === Store / transient ===
    #[error("Transfer unavailable: {0}")]
    TransferUnavailable(String),
}

impl LedgerError {
    /// Stable error name for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::AlreadyExists(_) => "ACCOUNT_ALREADY_EXISTS",
            LedgerError::Conflict(_) => "TRANSACTION_CONFLICT",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::BalanceOverflow => "BALANCE_OVERFLOW",
            LedgerError::TransferUnavailable(_) => "TRANSFER_UNAVAILABLE",
        }
    }

    /// Numeric code carried next to the name in error bodies
    pub fn numeric_code(&self) -> i32 {
        match self {
            LedgerError::InvalidInput(_) => 1001,
            LedgerError::AccountNotFound(_) => 2001,
            LedgerError::TransactionNotFound(_) => 2002,
            LedgerError::AlreadyExists(_) => 3001,
            LedgerError::Conflict(_) => 3002,
            LedgerError::InsufficientFunds => 4001,
            LedgerError::BalanceOverflow => 4002,
            LedgerError::TransferUnavailable(_) => 5001,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::AlreadyExists(_) | LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientFunds | LedgerError::BalanceOverflow => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::TransferUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Only store-level failures are safe to retry: the aborted unit of work
    /// left nothing behind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransferUnavailable(_))
    }

    /// Rule violations discovered under hold, after the record exists.
    /// These are persisted as `failed`.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds
                | LedgerError::BalanceOverflow
                | LedgerError::AccountNotFound(_)
        )
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        LedgerError::InvalidInput(e.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::TransferUnavailable(e.to_string())
    }
}

/// JSON body for every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Numeric error code
    #[schema(example = 4001)]
    pub code: i32,
    /// Stable error name
    #[schema(example = "INSUFFICIENT_FUNDS")]
    pub error: String,
    pub message: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.numeric_code(),
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.http_status(), Json(body)).into_response()
    }
}
