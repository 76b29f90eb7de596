use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::{FulfillmentStatus, PaymentMethod};
use crate::services::orders::{NewOrder, NewOrderLine, OrderListResponse, OrderResponse};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Store the order is placed against
    #[validate(length(min = 1, message = "store_id is required"))]
    pub store_id: String,
    /// Customer display name; defaults to "Guest"
    pub customer: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<OrderLineRequest>,
    /// Client-declared total, accepted for display only
    pub total: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct OrderLineRequest {
    pub name: String,
    #[serde(alias = "qty")]
    pub quantity: i32,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
}

impl From<OrderLineRequest> for NewOrderLine {
    fn from(line: OrderLineRequest) -> Self {
        NewOrderLine {
            name: line.name,
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Target fulfillment status: Pending, Preparing, Ready or Completed
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
pub struct OrderListQuery {
    /// Restrict the listing to one store
    pub store: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Create an order that settles outside the gateway (counter / wallet)
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    request.validate()?;

    let order = state
        .services
        .orders
        .create_order(NewOrder {
            store_id: request.store_id,
            customer: request.customer,
            items: request.items.into_iter().map(Into::into).collect(),
            declared_total: request.total,
            payment_method: request.payment_method,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// List orders, newest first
#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders", body = crate::ApiResponse<OrderListResponse>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let listing = state
        .services
        .orders
        .list_orders(
            query.store,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(20),
        )
        .await?;

    Ok(Json(ApiResponse::success(listing)))
}

/// Fetch one order with its line items
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(&order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

    Ok(Json(ApiResponse::success(order)))
}

/// Update an order's fulfillment status
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    params(("id" = String, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let status: FulfillmentStatus = request
        .status
        .parse()
        .map_err(|_| ServiceError::ValidationError(format!("invalid status: {}", request.status)))?;

    let order = state
        .services
        .orders
        .update_fulfillment_status(&order_id, status)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Order routes
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_order_status))
}
