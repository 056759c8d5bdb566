//! Phone OTP and cash-on-delivery verification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::OrderId;
use store::Store;

use crate::error::ApiError;
use crate::routes::orders::{AppState, OrderResponse};

#[derive(Deserialize)]
pub struct SendOtpRequest {
    pub phone: String,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct OtpStatusResponse {
    pub status: &'static str,
}

/// POST /otp/send — dispatch a phone-ownership code.
#[tracing::instrument(skip(state, req))]
pub async fn send<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<OtpStatusResponse>, ApiError> {
    state.cod.send_otp(&req.phone).await?;
    Ok(Json(OtpStatusResponse { status: "sent" }))
}

/// POST /otp/verify — confirm a phone-ownership code.
#[tracing::instrument(skip(state, req))]
pub async fn verify<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<OtpStatusResponse>, ApiError> {
    state.cod.verify_otp(&req.phone, &req.code).await?;
    Ok(Json(OtpStatusResponse { status: "verified" }))
}

/// POST /orders/:id/cod/verify — confirm the delivery code for a
/// cash-on-delivery order.
#[tracing::instrument(skip(state, req))]
pub async fn verify_delivery<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .cod
        .verify_delivery_otp(OrderId::from_uuid(id), &req.phone, &req.code)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}
