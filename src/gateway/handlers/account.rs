//! Account handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{AccountResponse, CreateAccountRequest, invalid_body, invalid_path};
use crate::error::{ErrorResponse, LedgerError};

/// Create an account with an opening balance
#[utoipa::path(
    post,
    path = "/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid account id or balance", body = ErrorResponse),
        (status = 409, description = "Account already exists", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountResponse>), LedgerError> {
    let Json(req) = payload.map_err(invalid_body)?;

    let account = state
        .accounts
        .create_account(req.account_id, &req.initial_balance)
        .await?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

/// Committed balance of one account
#[utoipa::path(
    get,
    path = "/accounts/{account_id}",
    params(("account_id" = i64, Path, description = "Account identifier (>= 1)")),
    responses(
        (status = 200, description = "Account found", body = AccountResponse),
        (status = 400, description = "Invalid account id", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    account_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<AccountResponse>, LedgerError> {
    let Path(account_id) = account_id.map_err(invalid_path)?;
    let account = state.accounts.get_account(account_id).await?;
    Ok(Json(account.into()))
}
