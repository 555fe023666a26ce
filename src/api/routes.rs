use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use super::{markets, orders, reports, wallets};
use crate::auth::{self, auth_middleware, AuthState};
use crate::error::LedgerResult;
use crate::fx::FxTable;
use crate::ledger::LedgerStore;
use crate::markets::MarketBook;
use crate::middleware::request_logging;
use crate::orders::OrderLifecycleManager;
use crate::portfolio::PortfolioReporter;
use crate::settlement::SettlementEngine;
use crate::wallets::WalletBook;

/// Shared application state. Every service holds a handle to the same ledger.
#[derive(Clone)]
pub struct AppState {
    pub wallets: WalletBook,
    pub orders: OrderLifecycleManager,
    pub markets: MarketBook,
    pub settlement: SettlementEngine,
    pub reports: PortfolioReporter,
}

impl AppState {
    pub fn new(store: LedgerStore, fee_rate: Decimal, fx: FxTable) -> LedgerResult<Self> {
        Ok(Self {
            wallets: WalletBook::new(store.clone()),
            orders: OrderLifecycleManager::new(store.clone()),
            markets: MarketBook::new(store.clone()),
            settlement: SettlementEngine::new(store.clone(), fee_rate)?,
            reports: PortfolioReporter::new(store, fx),
        })
    }
}

/// Create the API router
///
/// `/health`, register and login are public; everything else needs a bearer token.
pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let jwt_handler = auth_state.jwt_handler.clone();

    let auth_router = Router::new()
        .route("/api/auth/register", post(auth::api::register))
        .route("/api/auth/login", post(auth::api::login))
        .with_state(auth_state);

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::api::get_current_user))
        .route(
            "/api/wallets",
            post(wallets::create_wallet).get(wallets::list_wallets),
        )
        .route("/api/wallets/:id", get(wallets::get_wallet))
        .route("/api/wallets/:id/deposits", post(wallets::deposit))
        .route("/api/wallets/:id/entries", get(wallets::wallet_entries))
        .route(
            "/api/orders",
            post(orders::place_order).get(orders::list_orders),
        )
        .route(
            "/api/orders/:id",
            get(orders::get_order).patch(orders::cancel_order),
        )
        .route(
            "/api/markets",
            post(markets::create_market).get(markets::list_markets),
        )
        .route("/api/markets/:id", get(markets::get_market))
        .route("/api/markets/:id/close", post(markets::close_market))
        .route("/api/markets/:id/settle", post(markets::settle_market))
        .route("/api/revenue", get(reports::list_revenue))
        .route("/api/portfolio", get(reports::portfolio))
        .route("/api/analytics/weekly-volume", get(reports::weekly_volume))
        .route_layer(middleware::from_fn_with_state(jwt_handler, auth_middleware))
        .with_state(app_state);

    let public_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(auth_router)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
