//! Account repository
//!
//! Creation runs in its own unit of work: the id's row hold is taken first,
//! so two concurrent creates of the same id serialize and the loser sees
//! `AlreadyExists`. A unique-constraint violation on insert maps to the same
//! error for backends where a missing row cannot be held.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use super::models::{Account, AccountId};
use crate::error::LedgerError;
use crate::money;
use crate::store::{IsolationLevel, LedgerStore, StoreError, UnitOfWorkOptions};

pub struct AccountRepository {
    store: Arc<dyn LedgerStore>,
    lock_timeout: Duration,
}

impl AccountRepository {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Create an account with an opening balance given as decimal text.
    pub async fn create_account(
        &self,
        account_id: i64,
        initial_balance: &str,
    ) -> Result<Account, LedgerError> {
        let account_id = AccountId::new(account_id)?;
        let balance = money::parse_balance(initial_balance).map_err(|e| {
            LedgerError::InvalidInput(format!(
                "invalid initial balance '{}': {}",
                initial_balance, e
            ))
        })?;

        let account = self
            .insert_new(account_id, balance)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => LedgerError::AlreadyExists(account_id),
                other => other.into(),
            })?
            .ok_or(LedgerError::AlreadyExists(account_id))?;

        tracing::info!(
            account_id = %account.account_id,
            balance = %account.balance,
            "Account created"
        );
        Ok(account)
    }

    /// Returns `Ok(None)` when the id is already taken.
    async fn insert_new(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<Option<Account>, StoreError> {
        let options = UnitOfWorkOptions {
            isolation: IsolationLevel::RepeatableRead,
            lock_timeout: Some(self.lock_timeout),
        };
        let mut uow = self.store.begin(options).await?;

        if uow.lock_account(account_id).await?.is_some() {
            uow.rollback().await?;
            return Ok(None);
        }

        let account = uow.insert_account(account_id, balance).await?;
        uow.commit().await?;
        Ok(Some(account))
    }

    /// Committed point read, no hold taken.
    pub async fn get_account(&self, account_id: i64) -> Result<Account, LedgerError> {
        let account_id = AccountId::new(account_id)?;
        self.store
            .fetch_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Sum of all committed balances
    pub async fn total_balance(&self) -> Result<Decimal, LedgerError> {
        Ok(self.store.total_balance().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn repo() -> AccountRepository {
        AccountRepository::new(Arc::new(MemoryLedgerStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo();
        let created = repo.create_account(1, "500.00").await.unwrap();
        assert_eq!(created.balance.to_string(), "500.00000000");

        let fetched = repo.get_account(1).await.unwrap();
        assert_eq!(fetched.balance, dec!(500));
        assert_eq!(fetched.account_id.get(), 1);
    }

    #[tokio::test]
    async fn test_zero_opening_balance_allowed() {
        let repo = repo();
        let created = repo.create_account(9, "0").await.unwrap();
        assert!(created.balance.is_zero());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let repo = repo();
        repo.create_account(1, "10").await.unwrap();
        let err = repo.create_account(1, "20").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(id) if id.get() == 1));

        // Original balance untouched
        assert_eq!(repo.get_account(1).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_invalid_inputs() {
        let repo = repo();
        for (id, balance) in [(0, "1"), (-1, "1"), (1, "-5"), (1, "abc"), (1, "1.123456789")] {
            let err = repo.create_account(id, balance).await.unwrap_err();
            assert!(
                matches!(err, LedgerError::InvalidInput(_)),
                "({}, {:?}) should be invalid, got {:?}",
                id,
                balance,
                err
            );
        }
        assert!(repo.get_account(1).await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_account() {
        let err = repo().get_account(42).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_single_winner() {
        let repo = Arc::new(repo());
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.create_account(7, &format!("{}", i)).await
            }));
        }

        let mut created = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, LedgerError::AlreadyExists(_))),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_total_balance() {
        let repo = repo();
        assert_eq!(repo.total_balance().await.unwrap(), Decimal::ZERO);
        repo.create_account(1, "1.5").await.unwrap();
        repo.create_account(2, "2.25").await.unwrap();
        assert_eq!(repo.total_balance().await.unwrap(), dec!(3.75));
    }
}
