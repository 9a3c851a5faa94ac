//! The principal's open cart and checkout.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::VariantId;
use domain::{
    AddCartItem, CartView, CheckoutRequest, PriceQuote, RemoveCartItem, UpdateCartItem,
};
use serde::Deserialize;
use store::{CartItem, CommerceStore, Order};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::principal::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub variant_id: VariantId,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct PromotionCodeRequest {
    pub code: String,
}

/// GET /carts/me
#[tracing::instrument(skip_all)]
pub async fn get_mine<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    let view = state.carts.get_or_create_open_cart(&principal).await?;
    Ok(Json(view))
}

/// POST /carts/me/items
#[tracing::instrument(skip(state, principal))]
pub async fn add_item<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let item = state
        .carts
        .add_item(&principal, AddCartItem::new(req.variant_id, req.qty))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /carts/me/items/{item_id}
///
/// Answers 204 when a non-positive quantity removed the line.
#[tracing::instrument(skip(state, principal))]
pub async fn update_item<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(item_id): Path<String>,
    JsonBody(req): JsonBody<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    let item_id = parse_id(&item_id)?;
    let updated = state
        .carts
        .update_item(&principal, UpdateCartItem::new(item_id, req.qty))
        .await?;

    Ok(match updated {
        Some(item) => Json(item).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// DELETE /carts/me/items/{item_id}
#[tracing::instrument(skip(state, principal))]
pub async fn remove_item<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(item_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let item_id = parse_id(&item_id)?;
    state
        .carts
        .remove_item(&principal, RemoveCartItem::new(item_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /carts/me/apply-promotion previews totals; nothing is written.
#[tracing::instrument(skip(state, principal))]
pub async fn apply_promotion<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<PromotionCodeRequest>,
) -> Result<Json<PriceQuote>, ApiError> {
    let quote = state.carts.preview_promotion(&principal, &req.code).await?;
    Ok(Json(quote))
}

/// POST /carts/me/checkout
#[tracing::instrument(skip_all)]
pub async fn checkout<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.checkout.checkout(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
