//! Inventory ledger administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{MovementReason, VariantId};
use domain::{Reconciliation, RecordMovement};
use serde::Deserialize;
use store::{CommerceStore, InventoryMovement, Metadata};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::principal::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub variant_id: VariantId,
    pub change: i64,
    pub reason: MovementReason,
    #[serde(default)]
    pub metadata: Metadata,
}

/// POST /inventory/movements
#[tracing::instrument(skip(state, principal))]
pub async fn record_movement<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    JsonBody(req): JsonBody<RecordMovementRequest>,
) -> Result<(StatusCode, Json<InventoryMovement>), ApiError> {
    let cmd = RecordMovement::new(req.variant_id, req.change, req.reason)
        .with_metadata(req.metadata);
    let movement = state.inventory.record_movement(&principal, cmd).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// GET /variants/{id}/movements, newest first.
#[tracing::instrument(skip(state, principal))]
pub async fn movements<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<InventoryMovement>>, ApiError> {
    let movements = state.inventory.movements(&principal, parse_id(&id)?).await?;
    Ok(Json(movements))
}

/// GET /variants/{id}/reconciliation
#[tracing::instrument(skip(state, principal))]
pub async fn reconciliation<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Reconciliation>, ApiError> {
    let report = state.inventory.reconcile(&principal, parse_id(&id)?).await?;
    Ok(Json(report))
}
