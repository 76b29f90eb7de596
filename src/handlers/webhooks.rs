use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::WebhookDisposition;

/// Header carrying the gateway's whole-body HMAC.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Gateway webhook intake.
///
/// The signature covers the raw request body, so the body must reach the
/// verifier byte-for-byte as delivered; JSON parsing happens only after the
/// delivery is authenticated. Authenticated deliveries are answered 200 even
/// when the referenced order cannot be found — an unresolvable order is a
/// permanent condition the gateway must not keep retrying.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Delivery accepted"),
        (status = 400, description = "Missing or invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook delivery without signature header");
            ServiceError::ValidationError("missing signature header".to_string())
        })?;

    let disposition = state
        .services
        .payments
        .process_webhook(body, signature)
        .await?;

    match &disposition {
        WebhookDisposition::Processed(result) => {
            info!(
                order_id = %result.order_id,
                payment_status = %result.payment_status,
                changed = result.changed,
                "Webhook delivery reconciled"
            );
        }
        WebhookDisposition::Ignored(reason) => {
            info!(%reason, "Webhook delivery ignored");
        }
        WebhookDisposition::Unmatched(reason) => {
            warn!(%reason, "Webhook delivery acknowledged without reconciliation");
        }
    }

    Ok((StatusCode::OK, Json(serde_json::json!({ "ok": true }))))
}
