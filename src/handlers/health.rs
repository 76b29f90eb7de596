use axum::{extract::State, response::Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::db;
use crate::errors::ServiceError;
use crate::handlers::AppState;

/// Root endpoint - API info
pub async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "Canteen Orders API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "dbHealth": "/api/db-health",
            "orders": "/api/orders",
            "payments": "/api/payments/start",
            "verify": "/api/payments/verify",
            "webhook": "/api/payments/webhook"
        }
    }))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up")),
    tag = "Health"
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
}

/// Database connectivity probe
#[utoipa::path(
    get,
    path = "/api/db-health",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 500, description = "Database unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Health"
)]
pub async fn db_health(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    db::ping(&state.db).await?;
    Ok(Json(json!({ "ok": true })))
}
