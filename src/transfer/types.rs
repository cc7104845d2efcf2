//! Transfer Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::state::TransactionStatus;
use crate::account::AccountId;
use crate::error::LedgerError;
use crate::money;

/// Transaction identifier - random UUID v4
///
/// Generated at request time, independent of the caller and of the
/// `transactions.id` surrogate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(uuid::Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    pub fn inner(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// Transfer request as received from a caller; amount still text.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: i64,
    pub destination: i64,
    pub amount: String,
    /// Caller correlation id, attached to the transfer's span
    pub correlation_id: Option<String>,
}

impl TransferRequest {
    pub fn new(source: i64, destination: i64, amount: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            amount: amount.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Check every input constraint that needs no store access.
    pub fn validate(&self) -> Result<ValidatedTransfer, LedgerError> {
        let source = AccountId::new(self.source)
            .map_err(|_| invalid(format!("invalid source account id: {}", self.source)))?;
        let destination = AccountId::new(self.destination).map_err(|_| {
            invalid(format!(
                "invalid destination account id: {}",
                self.destination
            ))
        })?;

        if source == destination {
            return Err(invalid(
                "source and destination accounts cannot be the same",
            ));
        }

        let amount = money::parse_amount(&self.amount)
            .map_err(|e| invalid(format!("invalid amount '{}': {}", self.amount, e)))?;

        Ok(ValidatedTransfer {
            source,
            destination,
            amount,
        })
    }
}

fn invalid(msg: impl Into<String>) -> LedgerError {
    LedgerError::InvalidInput(msg.into())
}

/// Transfer whose ids and amount passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedTransfer {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
}

/// Transaction record stored in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// Reason recorded with a FAILED status
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// New record in PENDING state
    pub fn pending(transaction_id: TransactionId, transfer: &ValidatedTransfer) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            source: transfer.source,
            destination: transfer.destination,
            amount: transfer.amount,
            status: TransactionStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[{}] {} -> {} amount={} status={}",
            self.transaction_id, self.source, self.destination, self.amount, self.status
        )
    }
}
