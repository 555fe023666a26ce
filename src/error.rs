//! Ledger Error Taxonomy
//! Mission: Keep validation, precondition, conflict and invariant failures distinct

use crate::models::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input, rejected before the store is touched
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("market not found")]
    MarketNotFound,

    #[error("market is not open for stakes")]
    MarketNotOpen,

    #[error("a market with this title already exists")]
    MarketExists,

    #[error("wallet not found")]
    WalletNotFound,

    #[error("wallet already exists for this currency")]
    WalletExists,

    #[error("order not found")]
    OrderNotFound,

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("market is already settled")]
    AlreadySettled,

    /// A conditional status update lost a race
    #[error("order {order_id} is already {current}")]
    Conflict { order_id: Uuid, current: OrderStatus },

    #[error("insufficient permissions")]
    Forbidden,

    /// A ledger invariant would have been broken; always a bug upstream
    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Only a lost conditional update is worth re-fetching and retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MarketNotFound => "market_not_found",
            Self::MarketNotOpen => "market_not_open",
            Self::MarketExists => "market_exists",
            Self::WalletNotFound => "wallet_not_found",
            Self::WalletExists => "wallet_exists",
            Self::OrderNotFound => "order_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AlreadySettled => "already_settled",
            Self::Conflict { .. } => "conflict",
            Self::Forbidden => "forbidden",
            Self::Invariant(_) => "internal",
            Self::Storage(_) => "internal",
        }
    }
}
