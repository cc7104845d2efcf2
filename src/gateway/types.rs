//! Gateway request / response DTOs
//!
//! Amounts cross the boundary as JSON strings only. JSON numbers would be
//! parsed as floats by most clients before they ever reach us.

use axum::extract::rejection::{JsonRejection, PathRejection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::account::Account;
use crate::error::LedgerError;
use crate::transfer::TransactionRecord;

/// Header whose value becomes the transfer's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    #[schema(example = 1)]
    pub account_id: i64,
    /// Opening balance, decimal string with at most 8 fractional digits
    #[schema(example = "500.00")]
    pub initial_balance: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountResponse {
    #[schema(example = 1)]
    pub account_id: i64,
    #[schema(example = "500.00000000")]
    pub balance: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            account_id: account.account_id.get(),
            balance: account.balance.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    #[schema(example = 1)]
    pub source_account_id: i64,
    #[schema(example = 2)]
    pub destination_account_id: i64,
    #[schema(example = "100.00")]
    pub amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionCreatedResponse {
    #[schema(example = "2b1f7c1e-8a53-4a8e-9a0e-3f3c6f1d2a10")]
    pub transaction_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: String,
    /// pending | completed | failed
    #[schema(example = "completed")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            transaction_id: record.transaction_id.to_string(),
            source_account_id: record.source.get(),
            destination_account_id: record.destination.get(),
            amount: record.amount.to_string(),
            status: record.status.as_str().to_string(),
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Storage backend name
    #[schema(example = "postgres")]
    pub backend: String,
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
}

pub fn invalid_body(rejection: JsonRejection) -> LedgerError {
    LedgerError::InvalidInput(format!("invalid request body: {}", rejection.body_text()))
}

pub fn invalid_path(rejection: PathRejection) -> LedgerError {
    LedgerError::InvalidInput(format!("invalid path parameter: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use crate::transfer::{TransactionId, TransferRequest};
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_response_keeps_ledger_scale() {
        let now = Utc::now();
        let response = AccountResponse::from(Account {
            account_id: AccountId::new(3).unwrap(),
            balance: crate::money::parse_balance("12.5").unwrap(),
            created_at: now,
            updated_at: now,
        });
        assert_eq!(response.account_id, 3);
        assert_eq!(response.balance, "12.50000000");
    }

    #[test]
    fn test_transaction_response_shape() {
        let transfer = TransferRequest::new(1, 2, "7").validate().unwrap();
        let record = TransactionRecord::pending(TransactionId::new(), &transfer);
        let json = serde_json::to_value(TransactionResponse::from(record)).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["source_account_id"], 1);
        assert!(json.get("error").is_none());
        assert_eq!(transfer.amount, dec!(7));
    }

    #[test]
    fn test_amount_must_be_string() {
        let result = serde_json::from_str::<CreateTransactionRequest>(
            r#"{"source_account_id":1,"destination_account_id":2,"amount":10.5}"#,
        );
        assert!(result.is_err());
    }
}
