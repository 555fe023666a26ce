//! Wallet endpoints.

use super::error::{blocking, ApiError};
use super::routes::AppState;
use crate::models::{Actor, Currency, LedgerEntry, Wallet};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub currency: Currency,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

/// POST /api/wallets
pub async fn create_wallet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<CreateWalletRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Wallet>), ApiError> {
    let Json(request) = body?;
    let wallets = state.wallets.clone();
    let wallet =
        blocking(move || wallets.open(&actor, request.currency, request.balance)).await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

/// GET /api/wallets
pub async fn list_wallets(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Wallet>>, ApiError> {
    let wallets = state.wallets.clone();
    Ok(Json(blocking(move || wallets.list(&actor)).await?))
}

/// GET /api/wallets/:id
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Wallet>, ApiError> {
    let Path(wallet_id) = path?;
    let wallets = state.wallets.clone();
    Ok(Json(blocking(move || wallets.get(&actor, wallet_id)).await?))
}

/// POST /api/wallets/:id/deposits
pub async fn deposit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<Wallet>, ApiError> {
    let Path(wallet_id) = path?;
    let Json(request) = body?;
    let wallets = state.wallets.clone();
    let wallet = blocking(move || wallets.deposit(&actor, wallet_id, request.amount)).await?;
    Ok(Json(wallet))
}

/// GET /api/wallets/:id/entries
pub async fn wallet_entries(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let Path(wallet_id) = path?;
    let wallets = state.wallets.clone();
    Ok(Json(blocking(move || wallets.entries(&actor, wallet_id)).await?))
}
