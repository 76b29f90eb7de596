//! HTTP gateway client against a mock server.

use canteen_api::errors::ServiceError;
use canteen_api::gateway::{CreateIntentRequest, HttpPaymentGateway, IntentNotes, PaymentGateway};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn intent_request(receipt: &str) -> CreateIntentRequest {
    CreateIntentRequest {
        amount: 11000,
        currency: "INR".to_string(),
        receipt: receipt.to_string(),
        notes: IntentNotes {
            store_id: "store-1".to_string(),
        },
    }
}

#[tokio::test]
async fn creates_intent_with_receipt_and_minor_unit_amount() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(body_partial_json(serde_json::json!({
            "amount": 11000,
            "currency": "INR",
            "receipt": "ORD-TEST01"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "gw_abc",
            "amount": 11000,
            "currency": "INR",
            "receipt": "ORD-TEST01",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "key_id", "key_secret").unwrap();
    let intent = gateway
        .create_intent(intent_request("ORD-TEST01"))
        .await
        .expect("intent");

    assert_eq!(intent.id, "gw_abc");
    assert_eq!(intent.amount, 11000);
    assert_eq!(intent.currency, "INR");
}

#[tokio::test]
async fn gateway_error_maps_to_gateway_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "key_id", "key_secret").unwrap();
    let result = gateway.create_intent(intent_request("ORD-TEST02")).await;

    assert!(matches!(result, Err(ServiceError::GatewayUnavailable(_))));
}

#[tokio::test]
async fn undecodable_gateway_response_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "key_id", "key_secret").unwrap();
    let result = gateway.create_intent(intent_request("ORD-TEST03")).await;

    assert!(matches!(result, Err(ServiceError::GatewayUnavailable(_))));
}
