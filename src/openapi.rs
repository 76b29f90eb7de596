//! OpenAPI document assembly.

use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers::orders::{CreateOrderRequest, OrderLineRequest, UpdateOrderStatusRequest};
use crate::handlers::payments::{StartPaymentRequest, VerifyPaymentRequest, VerifyPaymentResponse};
use crate::models::{FulfillmentStatus, PaymentMethod, PaymentStatus};
use crate::services::orders::{OrderLineResponse, OrderListResponse, OrderResponse};
use crate::services::payments::{PaymentInitiation, ReconciliationResult};
use crate::ApiResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Canteen Orders API",
        description = "Order management with dual-channel gateway payment reconciliation"
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::db_health,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::payments::start_payment,
        crate::handlers::payments::verify_payment,
        crate::handlers::webhooks::payment_webhook,
    ),
    components(schemas(
        ErrorResponse,
        FulfillmentStatus,
        PaymentStatus,
        PaymentMethod,
        OrderLineRequest,
        CreateOrderRequest,
        UpdateOrderStatusRequest,
        StartPaymentRequest,
        VerifyPaymentRequest,
        VerifyPaymentResponse,
        OrderLineResponse,
        OrderResponse,
        OrderListResponse,
        PaymentInitiation,
        ReconciliationResult,
        ApiResponse<OrderResponse>,
        ApiResponse<OrderListResponse>,
        ApiResponse<PaymentInitiation>,
        ApiResponse<VerifyPaymentResponse>,
    )),
    tags(
        (name = "Health", description = "Liveness and connectivity probes"),
        (name = "Orders", description = "Order ledger operations"),
        (name = "Payments", description = "Payment initiation and reconciliation")
    )
)]
pub struct ApiDoc;
