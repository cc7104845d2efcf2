//! Transfer Engine
//!
//! One transfer is one unit of work:
//!
//! ```text
//! validate ─► record PENDING ─► begin ─► hold lower id ─► hold higher id
//!     ─► check funds ─► write both balances ─► CAS PENDING→COMPLETED ─► commit
//! ```
//!
//! The engine takes no in-process locks. Mutual exclusion comes from the
//! store's row holds, always acquired lower account id first, so any two
//! transfers touching the same pair queue on the same first row and cannot
//! deadlock.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info_span, warn};

use super::events::{TracingEvents, TransferEvents};
use super::records::TransactionRecordStore;
use super::types::{TransactionId, TransferRequest, ValidatedTransfer};
use crate::account::AccountId;
use crate::error::LedgerError;
use crate::money;
use crate::store::{LedgerStore, UnitOfWork, UnitOfWorkOptions};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied by [`TransferEngine::transfer`]
    pub default_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(5),
        }
    }
}

/// Order in which the two account rows are held.
#[inline]
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    records: TransactionRecordStore,
    events: Arc<dyn TransferEvents>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            records: TransactionRecordStore::new(store.clone()),
            store,
            events: Arc::new(TracingEvents),
            config: EngineConfig::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn TransferEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn records(&self) -> &TransactionRecordStore {
        &self.records
    }

    /// Move `amount` from source to destination under the default deadline.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransactionId, LedgerError> {
        self.transfer_within(request, self.config.default_deadline)
            .await
    }

    /// Move `amount` from source to destination.
    ///
    /// `deadline` bounds the unit of work including every hold wait. On
    /// expiry everything is rolled back and the call fails with
    /// `TransferUnavailable`.
    pub async fn transfer_within(
        &self,
        request: TransferRequest,
        deadline: Duration,
    ) -> Result<TransactionId, LedgerError> {
        let transfer = request.validate()?;
        let transaction_id = TransactionId::new();

        let span = info_span!(
            "transfer",
            transaction_id = %transaction_id,
            correlation_id = request.correlation_id.as_deref().unwrap_or("-"),
            source = %transfer.source,
            destination = %transfer.destination,
        );

        self.execute(transaction_id, transfer, deadline)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        transaction_id: TransactionId,
        transfer: ValidatedTransfer,
        deadline: Duration,
    ) -> Result<TransactionId, LedgerError> {
        let started = Instant::now();
        let record = self.records.create_record(transaction_id, &transfer).await?;
        self.events.record_created(&record);

        let outcome =
            match tokio::time::timeout(deadline, self.settle(transaction_id, &transfer, deadline))
                .await
            {
                Ok(outcome) => outcome,
                // The dropped settle future drops its unit of work, which rolls back.
                Err(_) => Err(LedgerError::TransferUnavailable(format!(
                    "deadline of {}ms expired",
                    deadline.as_millis()
                ))),
            };

        match outcome {
            Ok(()) => {
                self.events.completed(&record, started.elapsed());
                Ok(transaction_id)
            }
            Err(e) if e.is_business_rejection() => {
                if let Err(mark_err) = self.records.mark_failed(transaction_id, &e.to_string()).await
                {
                    warn!(
                        transaction_id = %transaction_id,
                        error = %mark_err,
                        "Failed to persist rejection, record left pending"
                    );
                }
                self.events.rejected(transaction_id, &e);
                Err(e)
            }
            Err(e) => {
                self.events.unavailable(transaction_id, &e);
                Err(e)
            }
        }
    }

    /// Run the unit of work; commit on success, roll back otherwise.
    async fn settle(
        &self,
        transaction_id: TransactionId,
        transfer: &ValidatedTransfer,
        deadline: Duration,
    ) -> Result<(), LedgerError> {
        let options = UnitOfWorkOptions::read_committed().with_lock_timeout(deadline);
        let mut uow = self.store.begin(options).await?;

        match self.apply(&mut *uow, transaction_id, transfer).await {
            Ok(()) => {
                uow.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        transaction_id: TransactionId,
        transfer: &ValidatedTransfer,
    ) -> Result<(), LedgerError> {
        let (first, second) = lock_order(transfer.source, transfer.destination);
        let first_row = uow
            .lock_account(first)
            .await?
            .ok_or(LedgerError::AccountNotFound(first))?;
        let second_row = uow
            .lock_account(second)
            .await?
            .ok_or(LedgerError::AccountNotFound(second))?;

        let (source, destination) = if first == transfer.source {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        if source.balance < transfer.amount {
            return Err(LedgerError::InsufficientFunds);
        }

        let new_source = source.balance - transfer.amount;
        let new_destination = destination
            .balance
            .checked_add(transfer.amount)
            .filter(|balance| *balance <= money::max_balance())
            .ok_or(LedgerError::BalanceOverflow)?;

        uow.update_balance(source.account_id, new_source).await?;
        uow.update_balance(destination.account_id, new_destination)
            .await?;

        if !self.records.mark_completed(uow, transaction_id).await? {
            return Err(LedgerError::TransferUnavailable(format!(
                "transaction {} is no longer pending",
                transaction_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountRepository;
    use crate::store::MemoryLedgerStore;
    use crate::transfer::{TransactionRecord, TransactionStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts each event kind
    #[derive(Default)]
    struct CountingEvents {
        created: AtomicUsize,
        completed: AtomicUsize,
        rejected: AtomicUsize,
        unavailable: AtomicUsize,
    }

    impl TransferEvents for CountingEvents {
        fn record_created(&self, _: &TransactionRecord) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        fn completed(&self, _: &TransactionRecord, _: Duration) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn rejected(&self, _: TransactionId, _: &LedgerError) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        fn unavailable(&self, _: TransactionId, _: &LedgerError) {
            self.unavailable.fetch_add(1, Ordering::SeqCst);
        }
        fn abandoned(&self, _: &TransactionRecord) {}
    }

    struct Harness {
        store: Arc<MemoryLedgerStore>,
        accounts: AccountRepository,
        engine: TransferEngine,
        events: Arc<CountingEvents>,
    }

    async fn harness(balances: &[(i64, &str)]) -> Harness {
        let store = Arc::new(MemoryLedgerStore::new());
        let accounts = AccountRepository::new(store.clone());
        for (id, balance) in balances {
            accounts.create_account(*id, balance).await.unwrap();
        }
        let events = Arc::new(CountingEvents::default());
        let engine = TransferEngine::new(store.clone()).with_events(events.clone());
        Harness {
            store,
            accounts,
            engine,
            events,
        }
    }

    async fn balance(h: &Harness, id: i64) -> Decimal {
        h.accounts.get_account(id).await.unwrap().balance
    }

    #[test]
    fn test_lock_order_is_canonical() {
        let a = AccountId::new(3).unwrap();
        let b = AccountId::new(9).unwrap();
        assert_eq!(lock_order(a, b), (a, b));
        assert_eq!(lock_order(b, a), (a, b));
    }

    #[tokio::test]
    async fn test_simple_transfer() {
        let h = harness(&[(1, "500"), (2, "500")]).await;
        let id = h
            .engine
            .transfer(TransferRequest::new(1, 2, "100"))
            .await
            .unwrap();

        assert_eq!(balance(&h, 1).await, dec!(400));
        assert_eq!(balance(&h, 2).await, dec!(600));
        assert_eq!(h.accounts.total_balance().await.unwrap(), dec!(1000));

        let record = h.engine.records().get(id).await.unwrap();
        assert_eq!(record.status, TransactionStatus::Completed);
        assert_eq!(h.events.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transfer_from_higher_id() {
        let h = harness(&[(1, "10"), (2, "10")]).await;
        h.engine
            .transfer(TransferRequest::new(2, 1, "2.5"))
            .await
            .unwrap();
        assert_eq!(balance(&h, 1).await, dec!(12.5));
        assert_eq!(balance(&h, 2).await, dec!(7.5));
    }

    #[tokio::test]
    async fn test_exact_balance_drains_to_zero() {
        let h = harness(&[(1, "0.00000001"), (2, "0")]).await;
        h.engine
            .transfer(TransferRequest::new(1, 2, "0.00000001"))
            .await
            .unwrap();
        assert!(balance(&h, 1).await.is_zero());
        assert_eq!(balance(&h, 2).await, dec!(0.00000001));
    }

    #[tokio::test]
    async fn test_insufficient_funds_records_failure() {
        let h = harness(&[(1, "100"), (2, "100")]).await;
        let err = h
            .engine
            .transfer(TransferRequest::new(1, 2, "200"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));

        assert_eq!(balance(&h, 1).await, dec!(100));
        assert_eq!(balance(&h, 2).await, dec!(100));
        assert_eq!(h.events.rejected.load(Ordering::SeqCst), 1);

        let failed = h
            .store
            .find_pending_before(chrono::Utc::now() + chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        assert!(failed.is_empty(), "rejected record must not stay pending");
    }

    #[tokio::test]
    async fn test_missing_account_records_failure() {
        let h = harness(&[(1, "100")]).await;
        let err = h
            .engine
            .transfer(TransferRequest::new(1, 99, "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(id) if id.get() == 99));
        assert_eq!(balance(&h, 1).await, dec!(100));
        assert_eq!(h.events.created.load(Ordering::SeqCst), 1);
        assert_eq!(h.events.rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_creates_no_record() {
        let h = harness(&[(1, "100"), (2, "100")]).await;
        for request in [
            TransferRequest::new(1, 1, "1"),
            TransferRequest::new(0, 2, "1"),
            TransferRequest::new(1, 2, "0"),
            TransferRequest::new(1, 2, "1.000000001"),
        ] {
            let err = h.engine.transfer(request).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)));
        }
        assert_eq!(h.events.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destination_overflow_rejected() {
        let max = money::max_balance().to_string();
        let h = harness(&[(1, "1"), (2, max.as_str())]).await;
        let err = h
            .engine
            .transfer(TransferRequest::new(1, 2, "0.5"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow));
        assert_eq!(balance(&h, 1).await, dec!(1));
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_record_pending() {
        let h = harness(&[(1, "50"), (2, "50")]).await;
        h.store.fail_next_commit();

        let err = h
            .engine
            .transfer(TransferRequest::new(1, 2, "10"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(balance(&h, 1).await, dec!(50));
        assert_eq!(h.events.unavailable.load(Ordering::SeqCst), 1);

        let pending = h
            .store
            .find_pending_before(chrono::Utc::now() + chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_expiry_while_held() {
        let h = harness(&[(1, "50"), (2, "50")]).await;

        let mut blocker = h.store.begin(UnitOfWorkOptions::default()).await.unwrap();
        blocker.lock_account(AccountId::new(2).unwrap()).await.unwrap();

        let err = h
            .engine
            .transfer_within(TransferRequest::new(1, 2, "10"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransferUnavailable(_)));
        drop(blocker);

        // Hold on account 1 was released by the rollback
        h.engine
            .transfer(TransferRequest::new(1, 2, "10"))
            .await
            .unwrap();
        assert_eq!(balance(&h, 1).await, dec!(40));
        assert_eq!(balance(&h, 2).await, dec!(60));
    }

    #[tokio::test]
    async fn test_second_settle_of_same_transaction_applies_nothing() {
        let h = harness(&[(1, "100"), (2, "100")]).await;
        let transfer = TransferRequest::new(1, 2, "10").validate().unwrap();
        let transaction_id = TransactionId::new();
        h.engine
            .records()
            .create_record(transaction_id, &transfer)
            .await
            .unwrap();

        let deadline = Duration::from_secs(5);
        h.engine
            .settle(transaction_id, &transfer, deadline)
            .await
            .unwrap();
        let err = h
            .engine
            .settle(transaction_id, &transfer, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransferUnavailable(_)));

        assert_eq!(balance(&h, 1).await, dec!(90));
        assert_eq!(balance(&h, 2).await, dec!(110));
        let record = h.engine.records().get(transaction_id).await.unwrap();
        assert_eq!(record.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_correlation_id_does_not_affect_outcome() {
        let h = harness(&[(1, "5"), (2, "5")]).await;
        h.engine
            .transfer(TransferRequest::new(1, 2, "5").with_correlation_id("req-42"))
            .await
            .unwrap();
        assert!(balance(&h, 1).await.is_zero());
    }
}
