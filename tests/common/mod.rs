//! Shared harness for integration tests: an application backed by an
//! in-memory SQLite database and a stub payment gateway.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use canteen_api::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{CreateIntentRequest, GatewayIntent, PaymentGateway},
    handlers::AppServices,
    services::signature::SignatureVerifier,
    AppState,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_KEY_ID: &str = "key_test_id";
pub const TEST_KEY_SECRET: &str = "key_test_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// In-process gateway double. Returns a fixed intent id, or fails every
/// call when `fail` is set.
pub struct StubGateway {
    pub intent_id: String,
    pub fail: bool,
}

impl StubGateway {
    pub fn returning(intent_id: &str) -> Arc<Self> {
        Arc::new(Self {
            intent_id: intent_id.to_string(),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            intent_id: String::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<GatewayIntent, ServiceError> {
        if self.fail {
            return Err(ServiceError::GatewayUnavailable(
                "stub gateway down".to_string(),
            ));
        }
        Ok(GatewayIntent {
            id: self.intent_id.clone(),
            amount: request.amount,
            currency: request.currency,
        })
    }
}

/// Helper harness spinning up application state backed by in-memory SQLite.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Construct a test application with a stub gateway answering `gw_1`.
    pub async fn new() -> Self {
        Self::with_gateway(StubGateway::returning("gw_1")).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::build(gateway, |_| {}).await
    }

    /// A deployment where the webhook secret was never provisioned; only the
    /// webhook endpoint should be affected.
    pub async fn without_webhook_secret() -> Self {
        Self::build(StubGateway::returning("gw_1"), |cfg| {
            cfg.gateway_webhook_secret = None;
        })
        .await
    }

    async fn build<F>(gateway: Arc<dyn PaymentGateway>, tweak: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18080, "test");
        // In-memory SQLite exists per connection; a single connection keeps
        // every query on the same database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.gateway_key_id = Some(TEST_KEY_ID.to_string());
        cfg.gateway_key_secret = Some(TEST_KEY_SECRET.to_string());
        cfg.gateway_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        tweak(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("schema setup");
        let pool = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let services =
            AppServices::with_gateway(pool.clone(), event_sender.clone(), &cfg, Some(gateway));

        let state = AppState {
            db: pool,
            config: cfg,
            event_sender,
            services,
        };
        let router = app_router(state.clone());

        Self { router, state }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Posts raw webhook bytes, optionally with a signature header.
    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/payments/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-razorpay-signature", sig);
        }
        let request = builder.body(Body::from(body.to_vec())).expect("request");
        self.router.clone().oneshot(request).await.expect("response")
    }
}

/// Signature a well-behaved client would send after checkout.
pub fn sign_client(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    SignatureVerifier::new(Some(TEST_KEY_SECRET.to_string()))
        .sign(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes())
        .expect("client signature")
}

/// Whole-body signature the gateway attaches to webhook deliveries.
pub fn sign_webhook(body: &[u8]) -> String {
    SignatureVerifier::new(Some(TEST_WEBHOOK_SECRET.to_string()))
        .sign(body)
        .expect("webhook signature")
}

/// A capture/failure delivery in the gateway's envelope shape.
pub fn webhook_body(receipt: &str, gateway_order_id: &str, payment_id: &str, status: &str) -> Vec<u8> {
    serde_json::json!({
        "event": format!("payment.{}", status),
        "payload": {
            "payment": {
                "entity": { "id": payment_id, "status": status, "order_id": gateway_order_id }
            },
            "order": {
                "entity": { "id": gateway_order_id, "receipt": receipt }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
