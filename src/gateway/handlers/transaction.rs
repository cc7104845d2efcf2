//! Transaction handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::HeaderMap,
};

use super::super::state::AppState;
use super::super::types::{
    CreateTransactionRequest, REQUEST_ID_HEADER, TransactionCreatedResponse, TransactionResponse,
    invalid_body, invalid_path,
};
use crate::error::{ErrorResponse, LedgerError};
use crate::transfer::{TransactionId, TransferRequest};

/// Transfer funds between two accounts
///
/// Returns once the transfer has committed. A 503 means nothing was applied
/// and the request may be retried.
#[utoipa::path(
    post,
    path = "/transactions",
    request_body = CreateTransactionRequest,
    params(("x-request-id" = Option<String>, Header, description = "Correlation id for logs")),
    responses(
        (status = 200, description = "Transfer completed", body = TransactionCreatedResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 409, description = "Transaction id conflict", body = ErrorResponse),
        (status = 422, description = "Insufficient funds", body = ErrorResponse),
        (status = 503, description = "Transfer unavailable, safe to retry", body = ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<Json<TransactionCreatedResponse>, LedgerError> {
    let Json(req) = payload.map_err(invalid_body)?;

    let mut request = TransferRequest::new(
        req.source_account_id,
        req.destination_account_id,
        req.amount,
    );
    if let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        request = request.with_correlation_id(request_id);
    }

    let transaction_id = state.engine.transfer(request).await?;
    Ok(Json(TransactionCreatedResponse {
        transaction_id: transaction_id.to_string(),
    }))
}

/// Look up a transaction record
#[utoipa::path(
    get,
    path = "/transactions/{transaction_id}",
    params(("transaction_id" = String, Path, description = "Transaction UUID")),
    responses(
        (status = 200, description = "Transaction found", body = TransactionResponse),
        (status = 400, description = "Malformed transaction id", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    transaction_id: Result<Path<String>, PathRejection>,
) -> Result<Json<TransactionResponse>, LedgerError> {
    let Path(raw) = transaction_id.map_err(invalid_path)?;
    let transaction_id: TransactionId = raw
        .parse()
        .map_err(|_| LedgerError::InvalidInput(format!("invalid transaction id: {}", raw)))?;

    let record = state.engine.records().get(transaction_id).await?;
    Ok(Json(record.into()))
}
