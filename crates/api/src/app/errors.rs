use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use eshop_infra::order_store::StoreError;
use eshop_orders::PlaceOrderError;

/// Client-facing rejection: `{ "message": ... }`.
pub fn json_message(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "message": message.into() }))).into_response()
}

/// Server-side failure: `{ "error": ... }`.
pub fn json_error(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": error.into() }))).into_response()
}

pub fn place_order_error_to_response(err: PlaceOrderError) -> axum::response::Response {
    match err {
        PlaceOrderError::InvalidRequest(msg) => json_message(StatusCode::BAD_REQUEST, msg),
        PlaceOrderError::ProductNotFound { .. } | PlaceOrderError::InsufficientStock { .. } => {
            json_message(StatusCode::BAD_REQUEST, err.to_string())
        }
        PlaceOrderError::StorageFailure(detail) => {
            tracing::error!(error = %detail, "order placement storage failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Order could not be placed, please try again later.",
            )
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal storage error.")
}
