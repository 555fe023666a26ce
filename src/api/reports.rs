//! Revenue, portfolio and volume reporting endpoints.

use super::error::{blocking, ApiError};
use super::routes::AppState;
use crate::models::{Actor, PlatformRevenue};
use crate::portfolio::{DailyVolume, Portfolio};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueQuery {
    pub market_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// GET /api/revenue?marketId=
pub async fn list_revenue(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<RevenueQuery>, QueryRejection>,
) -> Result<Json<Vec<PlatformRevenue>>, ApiError> {
    let Query(query) = query?;
    let engine = state.settlement.clone();
    Ok(Json(blocking(move || engine.revenue(&actor, query.market_id)).await?))
}

/// GET /api/portfolio?page=&pageSize=
pub async fn portfolio(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<PortfolioQuery>, QueryRejection>,
) -> Result<Json<Portfolio>, ApiError> {
    let Query(query) = query?;
    let reports = state.reports.clone();
    let portfolio = blocking(move || {
        reports.portfolio(&actor, query.page.unwrap_or(1), query.page_size.unwrap_or(10))
    })
    .await?;
    Ok(Json(portfolio))
}

/// GET /api/analytics/weekly-volume
pub async fn weekly_volume(
    State(state): State<AppState>,
) -> Result<Json<Vec<DailyVolume>>, ApiError> {
    let reports = state.reports.clone();
    Ok(Json(blocking(move || reports.weekly_volume()).await?))
}
