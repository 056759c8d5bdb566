//! HTTP API server with observability for the order lifecycle system.
//!
//! Provides REST endpoints for guest checkout, payment verification,
//! COD OTP flows, and admin fulfillment, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// GET /metrics — renders the Prometheus registry in text exposition
/// format.
async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + Send + Sync + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/log", get(routes::orders::log::<S>))
        .route(
            "/orders/{id}/verify-payment",
            post(routes::payments::verify::<S>),
        )
        .route(
            "/orders/{id}/refund-request",
            post(routes::orders::refund_request::<S>),
        )
        .route(
            "/orders/{id}/cod/verify",
            post(routes::otp::verify_delivery::<S>),
        )
        .route("/otp/send", post(routes::otp::send::<S>))
        .route("/otp/verify", post(routes::otp::verify::<S>))
        .route("/webhooks/payment", post(routes::payments::webhook::<S>))
        .route("/admin/orders/{id}/status", post(routes::admin::status::<S>))
        .route(
            "/admin/orders/{id}/refund/approve",
            post(routes::admin::refund_approve::<S>),
        )
        .route(
            "/admin/orders/{id}/refund/reject",
            post(routes::admin::refund_reject::<S>),
        )
        .route(
            "/admin/sweeps/payment-timeout",
            post(routes::admin::payment_timeout_sweep::<S>),
        )
        .route(
            "/admin/sweeps/cod-timeout",
            post(routes::admin::cod_timeout_sweep::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state, wiring every service onto the given
/// store, payment provider, and notifier.
pub fn create_state<S: Store + Clone + Send + Sync + 'static>(
    store: S,
    provider: Arc<dyn domain::PaymentProvider>,
    notifier: Arc<dyn domain::Notifier>,
    admin_token: String,
) -> Arc<AppState<S>> {
    use domain::{CheckoutService, CodService, FulfillmentService, PaymentService, SweepService};

    Arc::new(AppState {
        checkout: CheckoutService::new(store.clone(), provider.clone(), notifier.clone()),
        payments: PaymentService::new(store.clone(), provider.clone(), notifier.clone()),
        cod: CodService::new(store.clone(), notifier.clone()),
        fulfillment: FulfillmentService::new(store.clone(), provider, notifier),
        sweeps: SweepService::new(store.clone()),
        store,
        admin_token,
    })
}
