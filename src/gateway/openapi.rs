//! OpenAPI Documentation
//!
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use axum::Json;
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::gateway::types::{
    AccountResponse, CreateAccountRequest, CreateTransactionRequest, HealthResponse,
    TransactionCreatedResponse, TransactionResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Funds Ledger API",
        version = "1.0.0",
        description = "Accounts with exact decimal balances and atomic transfers between them."
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::account::create_account,
        crate::gateway::handlers::account::get_account,
        crate::gateway::handlers::transaction::create_transaction,
        crate::gateway::handlers::transaction::get_transaction,
    ),
    components(
        schemas(
            HealthResponse,
            CreateAccountRequest,
            AccountResponse,
            CreateTransactionRequest,
            TransactionCreatedResponse,
            TransactionResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "System", description = "Health"),
        (name = "Accounts", description = "Account creation and lookup"),
        (name = "Transactions", description = "Funds transfers"),
    )
)]
pub struct ApiDoc;

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/accounts", "/accounts/{account_id}", "/transactions", "/transactions/{transaction_id}"] {
            assert!(doc.paths.paths.contains_key(path), "missing path {}", path);
        }
    }

    #[test]
    fn test_openapi_serializes() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Funds Ledger API"));
        assert!(json.contains("ErrorResponse"));
    }
}
