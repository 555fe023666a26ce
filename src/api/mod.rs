//! HTTP surface over the ledger services.

pub mod error;
pub mod markets;
pub mod orders;
pub mod reports;
pub mod routes;
pub mod wallets;

pub use error::ApiError;
pub use routes::{create_router, AppState};
