//! Admin endpoints: fulfillment transitions, refund review, sweeps.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{OrderId, OrderStatus};
use store::Store;

use crate::error::ApiError;
use crate::routes::orders::{AppState, OrderResponse};
use crate::routes::require_admin;

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub cancelled: u32,
}

/// POST /admin/orders/:id/status — move an order along the fulfillment
/// path.
#[tracing::instrument(skip(state, headers, req))]
pub async fn status<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let order = state
        .fulfillment
        .admin_transition(OrderId::from_uuid(id), req.status)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /admin/orders/:id/refund/approve
#[tracing::instrument(skip(state, headers))]
pub async fn refund_approve<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let order = state.fulfillment.approve_refund(OrderId::from_uuid(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /admin/orders/:id/refund/reject
#[tracing::instrument(skip(state, headers))]
pub async fn refund_reject<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let order = state.fulfillment.reject_refund(OrderId::from_uuid(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /admin/sweeps/payment-timeout
#[tracing::instrument(skip(state, headers))]
pub async fn payment_timeout_sweep<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let cancelled = state.sweeps.run_payment_timeout_sweep().await?;
    Ok(Json(SweepResponse { cancelled }))
}

/// POST /admin/sweeps/cod-timeout
#[tracing::instrument(skip(state, headers))]
pub async fn cod_timeout_sweep<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let cancelled = state.sweeps.run_cod_timeout_sweep().await?;
    Ok(Json(SweepResponse { cancelled }))
}
