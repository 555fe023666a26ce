//! Order endpoints.

use super::error::{blocking, ApiError};
use super::routes::AppState;
use crate::models::{Actor, Order, Page};
use crate::orders::PlaceStake;
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

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    pub market_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// POST /api/orders
pub async fn place_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<PlaceStake>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(request) = body?;
    let orders = state.orders.clone();
    let order = blocking(move || orders.place_stake(&actor, request)).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders?marketId=&page=&pageSize=
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<OrderListQuery>, QueryRejection>,
) -> Result<Json<Page<Order>>, ApiError> {
    let Query(query) = query?;
    let orders = state.orders.clone();
    let page = blocking(move || {
        orders.orders(&actor, query.market_id, query.page, query.page_size)
    })
    .await?;
    Ok(Json(page))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(order_id) = path?;
    let orders = state.orders.clone();
    Ok(Json(blocking(move || orders.order(&actor, order_id)).await?))
}

/// PATCH /api/orders/:id - cancel a locked stake
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(order_id) = path?;
    let orders = state.orders.clone();
    Ok(Json(blocking(move || orders.cancel_stake(&actor, order_id)).await?))
}
