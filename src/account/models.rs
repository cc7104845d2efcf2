//! Account data model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;

/// Caller-supplied account identifier (>= 1).
///
/// Distinct from the surrogate `accounts.id` key, which never leaves the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct AccountId(i64);

impl AccountId {
    pub fn new(raw: i64) -> Result<Self, LedgerError> {
        if raw < 1 {
            return Err(LedgerError::InvalidInput(format!(
                "account id must be a positive integer, got {}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    #[inline]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for AccountId {
    type Error = LedgerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        AccountId::new(value)
    }
}

impl From<AccountId> for i64 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Committed account row
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_rejects_non_positive() {
        assert!(AccountId::new(0).is_err());
        assert!(AccountId::new(-5).is_err());
        assert_eq!(AccountId::new(1).unwrap().get(), 1);
    }

    #[test]
    fn test_account_id_ordering() {
        let low = AccountId::new(3).unwrap();
        let high = AccountId::new(10).unwrap();
        assert!(low < high);
    }

    #[test]
    fn test_account_id_serde() {
        let id: AccountId = serde_json::from_str("42").unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert!(serde_json::from_str::<AccountId>("0").is_err());
    }
}
