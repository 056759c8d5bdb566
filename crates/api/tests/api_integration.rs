//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

use common::Money;
use domain::{MockProvider, RecordingNotifier};
use store::{MemoryStore, Product, Store};

const ADMIN_TOKEN: &str = "test-admin-token";
const PHONE: &str = "9876543210";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> (Router, MemoryStore, RecordingNotifier) {
    let store = MemoryStore::new();
    store
        .insert_product(&Product {
            id: "SKU-TEE".into(),
            name: "Graphic Tee".to_string(),
            price: Money::from_cents(49_900),
            stock: 10,
        })
        .await
        .unwrap();
    store
        .insert_product(&Product {
            id: "SKU-CAP".into(),
            name: "Corduroy Cap".to_string(),
            price: Money::from_cents(19_900),
            stock: 5,
        })
        .await
        .unwrap();

    let notifier = RecordingNotifier::new();
    let state = api::create_state(
        store.clone(),
        Arc::new(MockProvider::new()),
        Arc::new(notifier.clone()),
        ADMIN_TOKEN.to_string(),
    );
    let app = api::create_app(state, get_metrics_handle());
    (app, store, notifier)
}

fn checkout_body(payment_method: &str) -> serde_json::Value {
    serde_json::json!({
        "items": [{ "product_id": "SKU-TEE", "quantity": 1, "size": "m" }],
        "shipping_address": {
            "name": "Asha Rao",
            "phone": PHONE,
            "address_line1": "14 Residency Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "postal_code": "560001"
        },
        "payment_method": payment_method
    })
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Places an online order and returns `(order_id, guest_id, payment_ref)`.
async fn online_checkout(app: &Router) -> (String, String, String) {
    let (status, created) = request(app, "POST", "/orders", &[], Some(checkout_body("online"))).await;
    assert_eq!(status, StatusCode::CREATED);
    (
        created["order_id"].as_str().unwrap().to_string(),
        created["guest_id"].as_str().unwrap().to_string(),
        created["payment"]["provider_order_id"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

/// Pays an online order through the verify endpoint (the mock provider
/// accepts any signature).
async fn pay(app: &Router, order_id: &str) {
    let (status, order) = request(
        app,
        "POST",
        &format!("/orders/{order_id}/verify-payment"),
        &[],
        Some(serde_json::json!({ "payment_id": "pay_test", "signature": "sig" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "paid");
}

/// Extracts the code from the most recent SMS to `phone`.
fn last_sms_code(notifier: &RecordingNotifier, phone: &str) -> String {
    let messages = notifier.sms_messages();
    let (_, body) = messages
        .iter()
        .rev()
        .find(|(to, _)| to == phone)
        .expect("no SMS sent to phone");
    body.split_whitespace().last().unwrap().to_string()
}

/// Verifies phone ownership through the OTP endpoints.
async fn verify_phone(app: &Router, notifier: &RecordingNotifier) {
    let (status, _) = request(
        app,
        "POST",
        "/otp/send",
        &[],
        Some(serde_json::json!({ "phone": PHONE })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let code = last_sms_code(notifier, "+919876543210");
    let (status, json) = request(
        app,
        "POST",
        "/otp/verify",
        &[],
        Some(serde_json::json!({ "phone": PHONE, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "verified");
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup().await;

    let (status, json) = request(&app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "api");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_and_guest_scoped_get() {
    let (app, _, _) = setup().await;

    let (order_id, guest_id, payment_ref) = online_checkout(&app).await;
    assert!(payment_ref.starts_with("mock_order_"));

    // Owner sees the order.
    let (status, order) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-guest-id", &guest_id)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["total_cents"], 49_900 + 4_900);
    assert_eq!(order["payment_ref"], payment_ref.as_str());
    // OTP material never appears in responses.
    assert!(order.get("cod_otp_hash").is_none());

    // No guest header: unauthorized.
    let (status, _) = request(&app, "GET", &format!("/orders/{order_id}"), &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Someone else's guest id: not found, not forbidden.
    let other = uuid::Uuid::new_v4().to_string();
    let (status, _) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-guest-id", &other)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_guest_header_is_rejected() {
    let (app, _, _) = setup().await;
    let fake_id = uuid::Uuid::new_v4();

    let (status, _) = request(
        &app,
        "GET",
        &format!("/orders/{fake_id}"),
        &[("x-guest-id", "not-a-uuid")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_rejects_bad_postal_code() {
    let (app, _, _) = setup().await;

    let mut body = checkout_body("online");
    body["shipping_address"]["postal_code"] = "12".into();
    let (status, json) = request(&app, "POST", "/orders", &[], Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_verify_payment_settles_order() {
    let (app, _, _) = setup().await;

    let (order_id, guest_id, _) = online_checkout(&app).await;
    pay(&app, &order_id).await;

    let (status, order) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-guest-id", &guest_id)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "paid");
    assert!(order["paid_at"].as_str().is_some());
}

#[tokio::test]
async fn test_webhook_settles_order_and_tolerates_replay() {
    let (app, _, _) = setup().await;

    let (order_id, guest_id, payment_ref) = online_checkout(&app).await;

    let webhook = serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": { "entity": { "order_id": payment_ref, "id": "pay_wh_1" } }
        }
    });
    let (status, _) = request(
        &app,
        "POST",
        "/webhooks/payment",
        &[("x-webhook-signature", "sig")],
        Some(webhook.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Replay is acknowledged without side effects.
    let (status, _) = request(
        &app,
        "POST",
        "/webhooks/payment",
        &[("x-webhook-signature", "sig")],
        Some(webhook),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, order) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-guest-id", &guest_id)],
        None,
    )
    .await;
    assert_eq!(order["status"], "paid");
}

#[tokio::test]
async fn test_webhook_requires_signature_header() {
    let (app, _, _) = setup().await;

    let (status, _) = request(
        &app,
        "POST",
        "/webhooks/payment",
        &[],
        Some(serde_json::json!({ "event": "payment.captured" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cod_checkout_and_delivery_verification() {
    let (app, _, notifier) = setup().await;

    // COD without a verified phone is rejected.
    let (status, _) = request(&app, "POST", "/orders", &[], Some(checkout_body("cod"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    verify_phone(&app, &notifier).await;

    let (status, created) =
        request(&app, "POST", "/orders", &[], Some(checkout_body("cod"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = created["order_id"].as_str().unwrap().to_string();
    let guest_id = created["guest_id"].as_str().unwrap().to_string();
    assert!(created["payment"].is_null());

    let (_, order) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        &[("x-guest-id", &guest_id)],
        None,
    )
    .await;
    assert_eq!(order["status"], "processing");
    assert_eq!(order["cod_verified"], false);

    // The delivery code was sent during checkout.
    let code = last_sms_code(&notifier, "+919876543210");
    let (status, order) = request(
        &app,
        "POST",
        &format!("/orders/{order_id}/cod/verify"),
        &[],
        Some(serde_json::json!({ "phone": PHONE, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["cod_verified"], true);
}

#[tokio::test]
async fn test_admin_endpoints_require_token() {
    let (app, _, _) = setup().await;
    let (order_id, _, _) = online_checkout(&app).await;

    let (status, _) = request(
        &app,
        "POST",
        &format!("/admin/orders/{order_id}/status"),
        &[],
        Some(serde_json::json!({ "status": "processing" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "POST",
        "/admin/sweeps/payment-timeout",
        &[("x-admin-token", "wrong")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}/log"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_status_transitions() {
    let (app, _, _) = setup().await;
    let (order_id, _, _) = online_checkout(&app).await;
    pay(&app, &order_id).await;

    // Paid orders cannot jump straight to shipped.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/admin/orders/{order_id}/status"),
        &[("x-admin-token", ADMIN_TOKEN)],
        Some(serde_json::json!({ "status": "shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for next in ["processing", "shipped", "delivered"] {
        let (status, order) = request(
            &app,
            "POST",
            &format!("/admin/orders/{order_id}/status"),
            &[("x-admin-token", ADMIN_TOKEN)],
            Some(serde_json::json!({ "status": next })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], next);
    }
}

#[tokio::test]
async fn test_refund_workflow_over_http() {
    let (app, _, _) = setup().await;
    let (order_id, guest_id, _) = online_checkout(&app).await;
    pay(&app, &order_id).await;

    // A guest cannot act on someone else's order.
    let other = uuid::Uuid::new_v4().to_string();
    let (status, _) = request(
        &app,
        "POST",
        &format!("/orders/{order_id}/refund-request"),
        &[("x-guest-id", &other)],
        Some(serde_json::json!({ "reason": "wrong size" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, order) = request(
        &app,
        "POST",
        &format!("/orders/{order_id}/refund-request"),
        &[("x-guest-id", &guest_id)],
        Some(serde_json::json!({ "reason": "wrong size" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "refund_pending");

    let (status, order) = request(
        &app,
        "POST",
        &format!("/admin/orders/{order_id}/refund/approve"),
        &[("x-admin-token", ADMIN_TOKEN)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "refunded");
}

#[tokio::test]
async fn test_order_log_records_the_trail() {
    let (app, _, _) = setup().await;
    let (order_id, _, _) = online_checkout(&app).await;
    pay(&app, &order_id).await;

    let (status, entries) = request(
        &app,
        "GET",
        &format!("/orders/{order_id}/log"),
        &[("x-admin-token", ADMIN_TOKEN)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["event"], "created");
    assert_eq!(entries[1]["event"], "success");
}

#[tokio::test]
async fn test_admin_sweeps_run() {
    let (app, _, _) = setup().await;
    let (_, _, _) = online_checkout(&app).await;

    // Fresh orders are inside the timeout window, so nothing cancels.
    let (status, json) = request(
        &app,
        "POST",
        "/admin/sweeps/payment-timeout",
        &[("x-admin-token", ADMIN_TOKEN)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], 0);

    let (status, json) = request(
        &app,
        "POST",
        "/admin/sweeps/cod-timeout",
        &[("x-admin-token", ADMIN_TOKEN)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], 0);
}

#[tokio::test]
async fn test_out_of_stock_is_conflict() {
    let (app, _, _) = setup().await;

    let mut body = checkout_body("online");
    body["items"][0]["quantity"] = 11.into();
    let (status, json) = request(&app, "POST", "/orders", &[], Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("SKU-TEE"));
}
