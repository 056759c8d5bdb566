//! Checkout and guest-facing order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{OrderId, OrderStatus, PaymentMethod};
use domain::{
    CheckoutRequest, CheckoutResponse, CheckoutService, CodService, FulfillmentService,
    PaymentService, SweepService,
};
use store::{Order, PaymentLogEntry, Store};

use crate::error::ApiError;
use crate::routes::{guest_id, require_admin, require_guest};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub checkout: CheckoutService<S>,
    pub payments: PaymentService<S>,
    pub cod: CodService<S>,
    pub fulfillment: FulfillmentService<S>,
    pub sweeps: SweepService<S>,
    pub admin_token: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

/// Guest-visible view of an order. OTP material never leaves the server.
#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub guest_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemResponse>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub payment_ref: Option<String>,
    pub cod_verified: bool,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            guest_id: order.guest_id.to_string(),
            status: order.status,
            payment_method: order.payment_method,
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name.clone(),
                    unit_price_cents: item.unit_price.cents(),
                    quantity: item.quantity,
                })
                .collect(),
            subtotal_cents: order.subtotal.cents(),
            tax_cents: order.tax.cents(),
            shipping_cents: order.shipping.cents(),
            total_cents: order.total.cents(),
            currency: order.currency.clone(),
            payment_ref: order.payment_ref.clone(),
            cod_verified: order.cod_verified,
            cancel_reason: order.cancel_reason.clone(),
            created_at: order.created_at,
            paid_at: order.paid_at,
            processing_at: order.processing_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            cancelled_at: order.cancelled_at,
            refunded_at: order.refunded_at,
        }
    }
}

#[derive(Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Handlers --

/// POST /orders — guest checkout.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let guest = guest_id(&headers)?;
    let response = state.checkout.create_order(req, guest).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/:id — guest-scoped order lookup.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let guest = require_guest(&headers)?;
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .find_order(order_id)
        .await?
        .filter(|o| o.guest_id == guest)
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/:id/log — payment audit trail (admin).
#[tracing::instrument(skip(state, headers))]
pub async fn log<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<PaymentLogEntry>>, ApiError> {
    require_admin(&headers, &state.admin_token)?;
    let entries = state
        .store
        .payment_log_for_order(OrderId::from_uuid(id))
        .await?;
    Ok(Json(entries))
}

/// POST /orders/:id/refund-request — guest cancel or refund request.
#[tracing::instrument(skip(state, headers, req))]
pub async fn refund_request<S: Store + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let guest = require_guest(&headers)?;
    let order = state
        .fulfillment
        .request_refund_or_cancel(OrderId::from_uuid(id), guest, req.reason)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}
