//! Payment verification and webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use common::OrderId;
use store::Store;

use crate::error::ApiError;
use crate::routes::orders::{AppState, OrderResponse};

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_id: String,
    pub signature: String,
}

/// POST /orders/:id/verify-payment — client-reported payment result.
#[tracing::instrument(skip(state, req))]
pub async fn verify<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .payments
        .verify_payment(OrderId::from_uuid(id), &req.payment_id, &req.signature)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /webhooks/payment — gateway webhook delivery.
///
/// The signature arrives in `x-webhook-signature` and covers the raw
/// body, so the body is taken as bytes rather than parsed JSON.
#[tracing::instrument(skip(state, headers, body))]
pub async fn webhook<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing x-webhook-signature header".to_string()))?;

    state.payments.handle_webhook(&body, signature).await?;
    Ok(StatusCode::OK)
}
