//! Thin client for the external payment gateway.
//!
//! The core only relies on one contract: creating a remote payment intent
//! for an amount returns an opaque gateway order id. Everything else the
//! gateway does (checkout UI, capture, settlement) happens out of band and
//! reaches us through the verify/webhook channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::errors::ServiceError;

/// Request to open a payment intent with the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    /// Amount in the currency's minor units (e.g. paise).
    pub amount: i64,
    pub currency: String,
    /// Our local order id; echoed back in webhook deliveries, which is how
    /// the reconciliation engine resolves them to ledger rows.
    pub receipt: String,
    pub notes: IntentNotes,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentNotes {
    pub store_id: String,
}

/// Gateway-side intent as returned by the create call.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Contract the payment initiator depends on; failures are opaque upstream
/// errors surfaced as `GatewayUnavailable`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntentRequest)
        -> Result<GatewayIntent, ServiceError>;
}

/// REST implementation speaking the gateway's orders API with basic auth.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<GatewayIntent, ServiceError> {
        let url = format!("{}/v1/orders", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway intent creation request failed");
                ServiceError::GatewayUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "Gateway rejected intent creation");
            return Err(ServiceError::GatewayUnavailable(format!(
                "gateway returned {}",
                status
            )));
        }

        let intent: GatewayIntent = response.json().await.map_err(|e| {
            error!(error = %e, "Gateway intent response could not be decoded");
            ServiceError::GatewayUnavailable(format!("invalid gateway response: {}", e))
        })?;

        info!(gateway_order_id = %intent.id, "Gateway intent created");
        Ok(intent)
    }
}
