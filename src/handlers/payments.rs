use crate::errors::ServiceError;
use crate::handlers::orders::OrderLineRequest;
use crate::handlers::AppState;
use crate::models::PaymentStatus;
use crate::services::payments::{InitiatePaymentRequest, PaymentInitiation};
use crate::ApiResponse;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartPaymentRequest {
    #[validate(length(min = 1, message = "store_id is required"))]
    pub store_id: String,
    pub customer: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<OrderLineRequest>,
    /// Client-declared total, accepted for display only
    pub total: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "gateway_order_id is required"))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, message = "gateway_payment_id is required"))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub ok: bool,
    pub payment_status: PaymentStatus,
}

/// Create a pending order and open a gateway payment intent for it
#[utoipa::path(
    post,
    path = "/api/payments/start",
    request_body = StartPaymentRequest,
    responses(
        (status = 200, description = "Payment initiated", body = crate::ApiResponse<PaymentInitiation>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn start_payment(
    State(state): State<AppState>,
    Json(request): Json<StartPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentInitiation>>, ServiceError> {
    request.validate()?;

    let initiation = state
        .services
        .payments
        .initiate_payment(InitiatePaymentRequest {
            store_id: request.store_id,
            customer: request.customer,
            items: request.items.into_iter().map(Into::into).collect(),
            declared_total: request.total,
        })
        .await?;

    Ok(Json(ApiResponse::success(initiation)))
}

/// Verify a client-reported capture and settle the order
#[utoipa::path(
    post,
    path = "/api/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = crate::ApiResponse<VerifyPaymentResponse>),
        (status = 400, description = "Invalid signature or mismatched order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>, ServiceError> {
    request.validate()?;

    let result = state
        .services
        .payments
        .verify_client_payment(
            &request.order_id,
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
        )
        .await?;

    Ok(Json(ApiResponse::success(VerifyPaymentResponse {
        ok: true,
        payment_status: result.payment_status,
    })))
}

/// Payment routes
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_payment))
        .route("/verify", post(verify_payment))
        .route("/webhook", post(super::webhooks::payment_webhook))
}
