use std::sync::Arc;

use crate::account::AccountRepository;
use crate::store::LedgerStore;
use crate::transfer::TransferEngine;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub accounts: Arc<AccountRepository>,
    pub engine: Arc<TransferEngine>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<AccountRepository>,
        engine: Arc<TransferEngine>,
    ) -> Self {
        Self {
            store,
            accounts,
            engine,
        }
    }

    /// Repository and engine wired to `store` with default settings
    pub fn from_store(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            accounts: Arc::new(AccountRepository::new(store.clone())),
            engine: Arc::new(TransferEngine::new(store.clone())),
            store,
        }
    }
}
