//! HTTP Gateway
//!
//! | Method | Path                              | Success        |
//! |--------|-----------------------------------|----------------|
//! | POST   | `/accounts`                       | 201 account    |
//! | GET    | `/accounts/{account_id}`          | 200 account    |
//! | POST   | `/transactions`                   | 200 id         |
//! | GET    | `/transactions/{transaction_id}`  | 200 record     |
//! | GET    | `/health`                         | 200 / 503      |
//! | GET    | `/api-docs/openapi.json`          | 200 document   |

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub use state::AppState;

/// Build the router with all routes bound to `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/{account_id}", get(handlers::get_account))
        .route("/transactions", post(handlers::create_transaction))
        .route("/transactions/{transaction_id}", get(handlers::get_transaction))
        .with_state(state)
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
}

/// Serve until `shutdown` flips to true, then give in-flight requests
/// `grace` to finish.
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} (port already in use?)", addr))?;

    tracing::info!(%addr, "Gateway listening");
    tracing::info!("API Docs: http://{}/api-docs/openapi.json", addr);

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .into_future();

    tokio::select! {
        result = server => result.context("Server error")?,
        _ = async {
            wait_for_shutdown(shutdown).await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period expired, dropping open connections");
        }
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
