//! Catalog administration: variants, pricing rules and promotions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{NewPricingRule, NewPromotion, NewVariant, PromotionSummary};
use store::{CommerceStore, PricingRule, Promotion, Variant};

use super::carts::PromotionCodeRequest;
use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::principal::CurrentUser;

/// POST /variants
#[tracing::instrument(skip(state, principal, req), fields(sku = %req.sku))]
pub async fn create_variant<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<NewVariant>,
) -> Result<(StatusCode, Json<Variant>), ApiError> {
    let variant = state.catalog.create_variant(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

/// GET /variants/{id}
#[tracing::instrument(skip(state, principal))]
pub async fn get_variant<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Variant>, ApiError> {
    let variant = state.catalog.get_variant(&principal, parse_id(&id)?).await?;
    Ok(Json(variant))
}

/// DELETE /variants/{id}
#[tracing::instrument(skip(state, principal))]
pub async fn delete_variant<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog
        .delete_variant(&principal, parse_id(&id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pricing-rules
#[tracing::instrument(skip_all)]
pub async fn create_pricing_rule<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<NewPricingRule>,
) -> Result<(StatusCode, Json<PricingRule>), ApiError> {
    let rule = state.catalog.create_pricing_rule(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// POST /promotions
#[tracing::instrument(skip(state, principal, req), fields(code = %req.code))]
pub async fn create_promotion<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<NewPromotion>,
) -> Result<(StatusCode, Json<Promotion>), ApiError> {
    let promotion = state.catalog.create_promotion(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// POST /promotions/apply checks a code without touching any cart.
#[tracing::instrument(skip_all)]
pub async fn apply_promotion<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<PromotionCodeRequest>,
) -> Result<Json<PromotionSummary>, ApiError> {
    let summary = state.catalog.apply_promotion(&principal, &req.code).await?;
    Ok(Json(summary))
}
