//! Market endpoints. Mutations require the admin role.

use super::error::{blocking, ApiError};
use super::routes::AppState;
use crate::ledger::MarketQuery;
use crate::markets::NewMarket;
use crate::models::{Actor, Market, MarketStatus, Outcome, Page};
use crate::settlement::SettlementReport;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketListQuery {
    pub category: Option<String>,
    pub status: Option<MarketStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl MarketListQuery {
    fn into_query(self) -> MarketQuery {
        let defaults = MarketQuery::default();
        MarketQuery {
            category: self.category,
            status: self.status,
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub winning_outcome: Outcome,
}

/// POST /api/markets
pub async fn create_market(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<NewMarket>, JsonRejection>,
) -> Result<(StatusCode, Json<Market>), ApiError> {
    let Json(request) = body?;
    let markets = state.markets.clone();
    let market = blocking(move || markets.create(&actor, request)).await?;
    Ok((StatusCode::CREATED, Json(market)))
}

/// GET /api/markets?category=&status=&page=&pageSize=
pub async fn list_markets(
    State(state): State<AppState>,
    query: Result<Query<MarketListQuery>, QueryRejection>,
) -> Result<Json<Page<Market>>, ApiError> {
    let Query(query) = query?;
    let markets = state.markets.clone();
    Ok(Json(blocking(move || markets.list(query.into_query())).await?))
}

/// GET /api/markets/:id
pub async fn get_market(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Market>, ApiError> {
    let Path(market_id) = path?;
    let markets = state.markets.clone();
    Ok(Json(blocking(move || markets.get(market_id)).await?))
}

/// POST /api/markets/:id/close
pub async fn close_market(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Market>, ApiError> {
    let Path(market_id) = path?;
    let markets = state.markets.clone();
    Ok(Json(blocking(move || markets.close(&actor, market_id)).await?))
}

/// POST /api/markets/:id/settle
pub async fn settle_market(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> Result<Json<SettlementReport>, ApiError> {
    let Path(market_id) = path?;
    let Json(request) = body?;
    let engine = state.settlement.clone();
    let report =
        blocking(move || engine.settle(&actor, market_id, request.winning_outcome)).await?;
    Ok(Json(report))
}
