//! HTTP error mapping and the bridge from async handlers to the blocking ledger.

use crate::error::{LedgerError, LedgerResult};
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    /// Request body, path or query could not be decoded
    Malformed(String),
    /// The blocking task itself failed (panic or cancellation)
    Task(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::MarketNotFound | LedgerError::WalletNotFound | LedgerError::OrderNotFound => {
            StatusCode::NOT_FOUND
        }
        LedgerError::MarketNotOpen | LedgerError::InsufficientFunds { .. } => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::AlreadySettled
        | LedgerError::Conflict { .. }
        | LedgerError::WalletExists
        | LedgerError::MarketExists => StatusCode::CONFLICT,
        LedgerError::Forbidden => StatusCode::FORBIDDEN,
        LedgerError::Invariant(_) | LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Ledger(err) => {
                let status = status_for(err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Ledger failure: {}", err);
                    (status, err.code(), "Internal server error".to_string())
                } else {
                    (status, err.code(), err.to_string())
                }
            }
            ApiError::Malformed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone()),
            ApiError::Task(msg) => {
                error!("Ledger task failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

/// Run a ledger call on the blocking pool so no async worker waits on the store lock.
pub async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Task(e.to_string()))?
        .map_err(ApiError::from)
}
