//! In-process Ledger Store
//!
//! Every account id owns an async mutex that acts as its exclusive row hold.
//! A unit of work stages its writes privately and applies them in one step
//! under the state lock at commit, so readers only ever see committed
//! states. Dropping a unit of work discards its writes and releases its
//! holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{LedgerStore, StoreError, UnitOfWork, UnitOfWorkOptions};
use crate::account::{Account, AccountId};
use crate::transfer::{TransactionId, TransactionRecord, TransactionStatus};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    records: HashMap<TransactionId, TransactionRecord>,
}

#[derive(Default)]
struct Inner {
    holds: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
    state: Mutex<MemoryState>,
    #[cfg(any(test, feature = "testing"))]
    fail_next_commit: AtomicBool,
}

impl Inner {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }

    fn hold_for(&self, account_id: AccountId) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut holds = self
            .holds
            .lock()
            .map_err(|_| StoreError::Unavailable("hold table lock poisoned".to_string()))?;
        Ok(holds.entry(account_id).or_default().clone())
    }

    /// Drop hold entries nobody holds or waits on. Guards and waiters each
    /// own a clone, so a strong count of one means only the table is left.
    fn release_holds(&self, account_ids: impl IntoIterator<Item = AccountId>) {
        let Ok(mut holds) = self.holds.lock() else {
            return;
        };
        for account_id in account_ids {
            if holds
                .get(&account_id)
                .is_some_and(|hold| Arc::strong_count(hold) == 1)
            {
                holds.remove(&account_id);
            }
        }
    }
}

/// In-process ledger store
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail after all holds were taken.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn hold_entries(&self) -> usize {
        self.inner.holds.lock().map(|holds| holds.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self, options: UnitOfWorkOptions) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            inner: self.inner.clone(),
            lock_timeout: options.lock_timeout,
            held: HashMap::new(),
            staged_inserts: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_completions: Vec::new(),
        }))
    }

    async fn fetch_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.state()?.accounts.get(&account_id).cloned())
    }

    async fn total_balance(&self) -> Result<Decimal, StoreError> {
        Ok(self
            .inner
            .state()?
            .accounts
            .values()
            .map(|a| a.balance)
            .sum())
    }

    async fn insert_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut state = self.inner.state()?;
        if state.records.contains_key(&record.transaction_id) {
            return Err(StoreError::Duplicate(format!(
                "transaction_id {}",
                record.transaction_id
            )));
        }
        state.records.insert(record.transaction_id, record.clone());
        Ok(())
    }

    async fn fetch_record(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.inner.state()?.records.get(&transaction_id).cloned())
    }

    async fn fail_record_if_pending(
        &self,
        transaction_id: TransactionId,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.state()?;
        match state.records.get_mut(&transaction_id) {
            Some(record) if record.status.can_transition_to(TransactionStatus::Failed) => {
                record.status = TransactionStatus::Failed;
                record.error = Some(reason.to_string());
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let state = self.inner.state()?;
        let mut stale: Vec<TransactionRecord> = state
            .records
            .values()
            .filter(|r| !r.status.is_terminal() && r.updated_at <= cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.state().map(|_| ())
    }
}

struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    lock_timeout: Option<Duration>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    staged_inserts: HashMap<AccountId, Account>,
    staged_balances: HashMap<AccountId, Decimal>,
    staged_completions: Vec<TransactionId>,
}

impl MemoryUnitOfWork {
    fn ensure_held(&self, account_id: AccountId) -> Result<(), StoreError> {
        if self.held.contains_key(&account_id) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "write to account {} without holding it",
                account_id
            )))
        }
    }

    /// Row as this unit of work sees it: committed state overlaid with
    /// staged writes.
    fn visible_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let mut account = match self.staged_inserts.get(&account_id) {
            Some(staged) => Some(staged.clone()),
            None => self.inner.state()?.accounts.get(&account_id).cloned(),
        };
        if let (Some(account), Some(balance)) =
            (account.as_mut(), self.staged_balances.get(&account_id))
        {
            account.balance = *balance;
        }
        Ok(account)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        if !self.held.contains_key(&account_id) {
            let hold = self.inner.hold_for(account_id)?;
            let guard = match self.lock_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, hold.lock_owned()).await {
                    Ok(guard) => guard,
                    Err(_) => {
                        self.inner.release_holds([account_id]);
                        return Err(StoreError::LockTimeout);
                    }
                },
                None => hold.lock_owned().await,
            };
            self.held.insert(account_id, guard);
        }
        self.visible_account(account_id)
    }

    async fn insert_account(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<Account, StoreError> {
        self.ensure_held(account_id)?;
        if balance.is_sign_negative() {
            return Err(StoreError::ConstraintViolation(
                "balance must be non-negative".to_string(),
            ));
        }
        if self.visible_account(account_id)?.is_some() {
            return Err(StoreError::Duplicate(format!("account_id {}", account_id)));
        }

        let now = Utc::now();
        let account = Account {
            account_id,
            balance,
            created_at: now,
            updated_at: now,
        };
        self.staged_inserts.insert(account_id, account.clone());
        Ok(account)
    }

    async fn update_balance(
        &mut self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        self.ensure_held(account_id)?;
        if balance.is_sign_negative() {
            return Err(StoreError::ConstraintViolation(
                "balance must be non-negative".to_string(),
            ));
        }
        if self.visible_account(account_id)?.is_none() {
            return Err(StoreError::Corrupt(format!(
                "update of missing account {}",
                account_id
            )));
        }
        self.staged_balances.insert(account_id, balance);
        Ok(())
    }

    async fn complete_record_if_pending(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<bool, StoreError> {
        if self.staged_completions.contains(&transaction_id) {
            return Ok(false);
        }
        let pending = matches!(
            self.inner.state()?.records.get(&transaction_id),
            Some(r) if r.status.can_transition_to(TransactionStatus::Completed)
        );
        if pending {
            self.staged_completions.push(transaction_id);
        }
        Ok(pending)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        #[cfg(any(test, feature = "testing"))]
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected commit failure".to_string()));
        }

        let mut state = self.inner.state()?;

        // Validate everything before applying anything.
        for transaction_id in &self.staged_completions {
            match state.records.get(transaction_id) {
                Some(r) if r.status.can_transition_to(TransactionStatus::Completed) => {}
                _ => {
                    return Err(StoreError::CommitFailed(format!(
                        "transaction {} is no longer pending",
                        transaction_id
                    )));
                }
            }
        }
        for account_id in self.staged_inserts.keys() {
            if state.accounts.contains_key(account_id) {
                return Err(StoreError::Duplicate(format!("account_id {}", account_id)));
            }
        }

        let now = Utc::now();
        for (account_id, account) in &self.staged_inserts {
            state.accounts.insert(*account_id, account.clone());
        }
        for (account_id, balance) in &self.staged_balances {
            if let Some(account) = state.accounts.get_mut(account_id) {
                account.balance = *balance;
                account.updated_at = now;
            }
        }
        for transaction_id in &self.staged_completions {
            if let Some(record) = state.records.get_mut(transaction_id) {
                record.status = TransactionStatus::Completed;
                record.updated_at = now;
            }
        }

        debug!(
            holds = self.held.len(),
            balances = self.staged_balances.len(),
            "memory unit of work committed"
        );
        // Holds are released when `self` drops, after the state is applied.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        let released: Vec<AccountId> = self
            .held
            .drain()
            .map(|(account_id, _guard)| account_id)
            .collect();
        self.inner.release_holds(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferRequest;
    use rust_decimal_macros::dec;

    fn id(raw: i64) -> AccountId {
        AccountId::new(raw).unwrap()
    }

    async fn seed(store: &MemoryLedgerStore, account_id: i64, balance: Decimal) {
        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        assert!(uow.lock_account(id(account_id)).await.unwrap().is_none());
        uow.insert_account(id(account_id), balance).await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;

        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        uow.lock_account(id(1)).await.unwrap();
        uow.update_balance(id(1), dec!(40)).await.unwrap();

        let committed = store.fetch_account(id(1)).await.unwrap().unwrap();
        assert_eq!(committed.balance, dec!(100));

        uow.commit().await.unwrap();
        let committed = store.fetch_account(id(1)).await.unwrap().unwrap();
        assert_eq!(committed.balance, dec!(40));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;

        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        uow.lock_account(id(1)).await.unwrap();
        uow.update_balance(id(1), dec!(1)).await.unwrap();
        uow.rollback().await.unwrap();

        {
            let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
            uow.lock_account(id(1)).await.unwrap();
            uow.update_balance(id(1), dec!(2)).await.unwrap();
        }

        let committed = store.fetch_account(id(1)).await.unwrap().unwrap();
        assert_eq!(committed.balance, dec!(100));
    }

    #[tokio::test]
    async fn test_hold_blocks_until_release() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;

        let mut first = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        first.lock_account(id(1)).await.unwrap();

        let opts = UnitOfWorkOptions::default().with_lock_timeout(Duration::from_millis(50));
        let mut second = store.begin(opts).await.unwrap();
        assert_eq!(
            second.lock_account(id(1)).await.unwrap_err(),
            StoreError::LockTimeout
        );

        first.update_balance(id(1), dec!(70)).await.unwrap();
        first.commit().await.unwrap();

        let row = second.lock_account(id(1)).await.unwrap().unwrap();
        assert_eq!(row.balance, dec!(70));
    }

    #[tokio::test]
    async fn test_hold_entries_released_with_unit_of_work() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;
        assert_eq!(store.hold_entries(), 0);

        for missing in 1_000..11_000 {
            let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
            assert!(uow.lock_account(id(missing)).await.unwrap().is_none());
        }
        assert_eq!(store.hold_entries(), 0);

        let mut holder = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        holder.lock_account(id(1)).await.unwrap();
        assert_eq!(store.hold_entries(), 1);

        // A timed-out waiter leaves the holder's entry in place
        let opts = UnitOfWorkOptions::default().with_lock_timeout(Duration::from_millis(10));
        let mut waiter = store.begin(opts).await.unwrap();
        assert_eq!(
            waiter.lock_account(id(1)).await.unwrap_err(),
            StoreError::LockTimeout
        );
        assert_eq!(store.hold_entries(), 1);

        holder.rollback().await.unwrap();
        drop(waiter);
        assert_eq!(store.hold_entries(), 0);

        // A released id can be held again
        let mut again = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        let row = again.lock_account(id(1)).await.unwrap().unwrap();
        assert_eq!(row.balance, dec!(100));
    }

    #[tokio::test]
    async fn test_write_requires_hold() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;

        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        assert!(matches!(
            uow.update_balance(id(1), dec!(1)).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_balance_rejected() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;

        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        uow.lock_account(id(1)).await.unwrap();
        assert!(matches!(
            uow.update_balance(id(1), dec!(-0.01)).await,
            Err(StoreError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_applies_once() {
        let store = MemoryLedgerStore::new();
        let transfer = TransferRequest::new(1, 2, "5").validate().unwrap();
        let record = TransactionRecord::pending(TransactionId::new(), &transfer);
        store.insert_record(&record).await.unwrap();

        let mut first = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        let mut second = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        assert!(first
            .complete_record_if_pending(record.transaction_id)
            .await
            .unwrap());
        assert!(second
            .complete_record_if_pending(record.transaction_id)
            .await
            .unwrap());

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::CommitFailed(_))
        ));

        let stored = store.fetch_record(record.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let store = MemoryLedgerStore::new();
        let transfer = TransferRequest::new(1, 2, "5").validate().unwrap();
        let record = TransactionRecord::pending(TransactionId::new(), &transfer);
        store.insert_record(&record).await.unwrap();
        assert!(matches!(
            store.insert_record(&record).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_commit_failure_applies_nothing() {
        let store = MemoryLedgerStore::new();
        seed(&store, 1, dec!(100)).await;
        store.fail_next_commit();

        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        uow.lock_account(id(1)).await.unwrap();
        uow.update_balance(id(1), dec!(0)).await.unwrap();
        assert!(matches!(
            uow.commit().await,
            Err(StoreError::CommitFailed(_))
        ));

        let committed = store.fetch_account(id(1)).await.unwrap().unwrap();
        assert_eq!(committed.balance, dec!(100));
    }
}
