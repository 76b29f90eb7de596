//! End-to-end payment flows over HTTP: initiation, client verification,
//! webhook deliveries, and the failure paths of each.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    response_json, sign_client, sign_webhook, webhook_body, StubGateway, TestApp,
};
use serde_json::{json, Value};

async fn start_payment(app: &TestApp) -> (String, String) {
    let response = app
        .request(
            Method::POST,
            "/api/payments/start",
            Some(json!({
                "store_id": "store-1",
                "customer": "Asha",
                "items": [{ "name": "Filter Coffee", "quantity": 1, "unit_price": 110 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    (
        data["order_id"].as_str().expect("order id").to_string(),
        data["gateway_order_id"]
            .as_str()
            .expect("gateway order id")
            .to_string(),
    )
}

async fn payment_state(app: &TestApp, order_id: &str) -> (String, Option<String>, Option<String>) {
    let model = app
        .state
        .services
        .orders
        .find_model(order_id)
        .await
        .expect("ledger read")
        .expect("order exists");
    (
        model.payment_status,
        model.gateway_payment_id,
        model.gateway_signature,
    )
}

#[tokio::test]
async fn initiation_returns_gateway_intent_and_amount_in_minor_units() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/start",
            Some(json!({
                "store_id": "store-1",
                "items": [{ "name": "Masala Dosa", "quantity": 2, "unit_price": 55 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["gateway_order_id"], "gw_1");
    assert_eq!(data["amount_minor"], 11000);
    assert_eq!(data["currency"], "INR");
    assert_eq!(data["key_id"], common::TEST_KEY_ID);
    assert!(data["order_id"].as_str().unwrap().starts_with("ORD-"));
}

#[tokio::test]
async fn client_verify_settles_order_and_duplicate_verify_is_a_noop() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let signature = sign_client(&gateway_order_id, "pay_1");
    let verify_request = json!({
        "order_id": order_id,
        "gateway_order_id": gateway_order_id,
        "gateway_payment_id": "pay_1",
        "signature": signature
    });

    let response = app
        .request(Method::POST, "/api/payments/verify", Some(verify_request.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["ok"], true);
    assert_eq!(body["data"]["payment_status"], "paid");

    let (status, payment_id, stored_signature) = payment_state(&app, &order_id).await;
    assert_eq!(status, "paid");
    assert_eq!(payment_id.as_deref(), Some("pay_1"));
    assert_eq!(stored_signature.as_deref(), Some(signature.as_str()));

    // Second identical verify succeeds without touching the audit fields.
    let response = app
        .request(Method::POST, "/api/payments/verify", Some(verify_request))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["ok"], true);

    let (status, payment_id, signature_after) = payment_state(&app, &order_id).await;
    assert_eq!(status, "paid");
    assert_eq!(payment_id.as_deref(), Some("pay_1"));
    assert_eq!(signature_after.as_deref(), Some(signature.as_str()));
}

#[tokio::test]
async fn client_verify_rejects_tampered_signature_without_mutation() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let mut signature = sign_client(&gateway_order_id, "pay_1");
    let flipped = if signature.ends_with('0') { "1" } else { "0" };
    signature.truncate(signature.len() - 1);
    signature.push_str(flipped);

    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_1",
                "signature": signature
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, payment_id, stored_signature) = payment_state(&app, &order_id).await;
    assert_eq!(status, "pending");
    assert_eq!(payment_id, None);
    assert_eq!(stored_signature, None);
}

#[tokio::test]
async fn client_verify_unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_id": "ORD-MISSING",
                "gateway_order_id": "gw_1",
                "gateway_payment_id": "pay_1",
                "signature": sign_client("gw_1", "pay_1")
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_verify_rejects_mismatched_gateway_order_even_with_valid_signature() {
    let app = TestApp::new().await;
    let (order_id, _) = start_payment(&app).await;

    // Signature is internally consistent, but for a different intent.
    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": "gw_other",
                "gateway_payment_id": "pay_1",
                "signature": sign_client("gw_other", "pay_1")
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, payment_id, _) = payment_state(&app, &order_id).await;
    assert_eq!(status, "pending");
    assert_eq!(payment_id, None);
}

#[tokio::test]
async fn webhook_capture_settles_order() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "captured");
    let response = app.post_webhook(&body, Some(&sign_webhook(&body))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, payment_id, stored_signature) = payment_state(&app, &order_id).await;
    assert_eq!(status, "paid");
    assert_eq!(payment_id.as_deref(), Some("pay_9"));
    assert!(stored_signature.is_some());
}

#[tokio::test]
async fn webhook_replay_acknowledges_without_changing_fields() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "captured");
    let signature = sign_webhook(&body);

    let response = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = app
        .state
        .services
        .orders
        .find_model(&order_id)
        .await
        .unwrap()
        .unwrap();

    let response = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let replayed = app
        .state
        .services
        .orders
        .find_model(&order_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snapshot, replayed);
}

#[tokio::test]
async fn webhook_rejects_bad_signature_before_parsing() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "captured");
    let response = app.post_webhook(&body, Some("deadbeef")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, payment_id, _) = payment_state(&app, &order_id).await;
    assert_eq!(status, "pending");
    assert_eq!(payment_id, None);
}

#[tokio::test]
async fn webhook_requires_signature_header() {
    let app = TestApp::new().await;
    let body = webhook_body("ORD-ANY", "gw_1", "pay_9", "captured");

    let response = app.post_webhook(&body, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_acknowledged() {
    let app = TestApp::new().await;

    let body = webhook_body("ORD-MISSING", "gw_1", "pay_9", "captured");
    let response = app.post_webhook(&body, Some(&sign_webhook(&body))).await;
    // A permanent mismatch must not look retryable to the gateway.
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_failed_event_downgrades_only_pending_orders() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "failed");
    let response = app.post_webhook(&body, Some(&sign_webhook(&body))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _, _) = payment_state(&app, &order_id).await;
    assert_eq!(status, "failed");
}

#[tokio::test]
async fn webhook_failed_event_never_downgrades_paid_orders() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let capture = webhook_body(&order_id, &gateway_order_id, "pay_9", "captured");
    app.post_webhook(&capture, Some(&sign_webhook(&capture))).await;

    let failure = webhook_body(&order_id, &gateway_order_id, "pay_9", "failed");
    let response = app.post_webhook(&failure, Some(&sign_webhook(&failure))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, payment_id, _) = payment_state(&app, &order_id).await;
    assert_eq!(status, "paid");
    assert_eq!(payment_id.as_deref(), Some("pay_9"));
}

#[tokio::test]
async fn webhook_with_unhandled_status_is_ignored() {
    let app = TestApp::new().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "authorized");
    let response = app.post_webhook(&body, Some(&sign_webhook(&body))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _, _) = payment_state(&app, &order_id).await;
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn gateway_outage_surfaces_as_bad_gateway_and_keeps_pending_order() {
    let app = TestApp::with_gateway(StubGateway::failing()).await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/start",
            Some(json!({
                "store_id": "store-1",
                "items": [{ "name": "Thali", "quantity": 1, "unit_price": 90 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The local order survives for a client-driven retry.
    let listing = app.request(Method::GET, "/api/orders", None).await;
    let body = response_json(listing).await;
    let orders = body["data"]["orders"].as_array().expect("orders array");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["payment_status"], "pending");
    assert_eq!(orders[0]["gateway_order_id"], Value::Null);
}

#[tokio::test]
async fn alias_routes_reach_the_same_handlers() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/create-order",
            Some(json!({
                "store_id": "store-1",
                "items": [{ "name": "Filter Coffee", "quantity": 1, "unit_price": 110 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    let gateway_order_id = body["data"]["gateway_order_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/verify-payment",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_1",
                "signature": sign_client(&gateway_order_id, "pay_1")
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["ok"], true);
}

#[tokio::test]
async fn missing_webhook_secret_fails_only_the_webhook_endpoint() {
    let app = TestApp::without_webhook_secret().await;
    let (order_id, gateway_order_id) = start_payment(&app).await;

    let body = webhook_body(&order_id, &gateway_order_id, "pay_9", "captured");
    let response = app.post_webhook(&body, Some(&sign_webhook(&body))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The client-verify channel keeps functioning.
    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_1",
                "signature": sign_client(&gateway_order_id, "pay_1")
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejects_payment_initiation_with_invalid_items() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/start",
            Some(json!({ "store_id": "store-1", "items": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/payments/start",
            Some(json!({
                "store_id": "store-1",
                "items": [{ "name": "Free sample", "quantity": 1, "unit_price": 0 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
