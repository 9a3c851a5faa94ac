//! Customer profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use store::{CommerceStore, Customer};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::principal::CurrentUser;

/// GET /customers/me
#[tracing::instrument(skip_all)]
pub async fn me<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Customer>, ApiError> {
    Ok(Json(state.customers.me(&principal).await?))
}

/// DELETE /customers/{id} (staff)
#[tracing::instrument(skip(state, principal))]
pub async fn delete<S: CommerceStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.customers.delete(&principal, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
