//! Funds Ledger service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Config  │───▶│  Store   │───▶│ Repository + │───▶│   Gateway    │
//! │  (YAML)  │    │ (PG/mem) │    │    Engine    │    │   (axum)     │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────────┘
//!                                        │
//!                                        └──▶ stale pending sweeper
//! ```

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use funds_ledger::account::AccountRepository;
use funds_ledger::config::{AppConfig, StorageBackend};
use funds_ledger::db::{Database, schema};
use funds_ledger::gateway::{self, AppState};
use funds_ledger::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use funds_ledger::transfer::{StaleTransferSweeper, TracingEvents, TransferEngine};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-process ledger store, state is lost on exit");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
        StorageBackend::Postgres => {
            let db = Database::connect(
                &config.storage.postgres_url,
                config.storage.max_connections,
                Duration::from_millis(config.storage.acquire_timeout_ms),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;

            if config.storage.run_migrations {
                schema::run_migrations(db.pool())
                    .await
                    .context("Failed to apply ledger schema")?;
            }
            Ok(Arc::new(PgLedgerStore::new(db.pool().clone())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = funds_ledger::logging::init_logging(&app_config);

    tracing::info!(env = %env, backend = ?app_config.storage.backend, "Starting Funds Ledger");

    let store = open_store(&app_config).await?;
    let events = Arc::new(TracingEvents);

    let uow_timeout = Duration::from_millis(app_config.transfer.unit_of_work_timeout_ms);
    let accounts = Arc::new(AccountRepository::new(store.clone()).with_lock_timeout(uow_timeout));
    let engine = Arc::new(
        TransferEngine::new(store.clone())
            .with_events(events.clone())
            .with_config(app_config.transfer.engine_config()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = if app_config.transfer.sweeper_enabled {
        let sweeper = StaleTransferSweeper::new(
            engine.records().clone(),
            events,
            app_config.transfer.sweeper_config(),
        );
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { sweeper.run(rx).await }))
    } else {
        tracing::info!("Stale transfer sweeper disabled");
        None
    };

    tokio::spawn(async move {
        gateway::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let state = Arc::new(AppState::new(store, accounts, engine));
    let result = gateway::run_server(
        &app_config.gateway.host,
        app_config.gateway.port,
        state,
        shutdown_rx,
        Duration::from_secs(app_config.gateway.shutdown_grace_secs),
    )
    .await;

    if let Some(handle) = sweeper_handle
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Sweeper task failed");
    }

    result
}
