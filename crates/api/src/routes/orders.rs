//! Order history and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderStatus;
use domain::UpdateOrderStatus;
use serde::Deserialize;
use store::{CommerceStore, Order};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::principal::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// GET /orders/me lists the caller's orders, newest first.
#[tracing::instrument(skip_all)]
pub async fn list_mine<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_mine(&principal).await?))
}

/// GET /orders (staff)
#[tracing::instrument(skip_all)]
pub async fn list_all<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_all(&principal).await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, principal))]
pub async fn get<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get(&principal, parse_id(&id)?).await?;
    Ok(Json(order))
}

/// PATCH /orders/{id}/status (staff)
#[tracing::instrument(skip(state, principal))]
pub async fn update_status<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let cmd = UpdateOrderStatus::new(parse_id(&id)?, req.status);
    let order = state.orders.update_status(&principal, cmd).await?;
    Ok(Json(order))
}
