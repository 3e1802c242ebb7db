use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use eshop_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order))
        .route("/:user_id", get(list_user_orders))
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::PlaceOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_message(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    // Shape errors are rejected here, before a connection is checked out.
    let cmd = match body.into_command() {
        Ok(cmd) => cmd,
        Err(e) => return errors::place_order_error_to_response(e),
    };

    match services.orders().place_order(&cmd).await {
        Ok(placed) => (
            StatusCode::CREATED,
            Json(dto::OrderCreatedResponse::from(&placed)),
        )
            .into_response(),
        Err(e) => errors::place_order_error_to_response(e),
    }
}

pub async fn list_user_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match user_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_message(StatusCode::BAD_REQUEST, "invalid user id"),
    };

    match services.orders().orders_for_user(user_id).await {
        Ok(orders) if orders.is_empty() => {
            errors::json_message(StatusCode::NOT_FOUND, "No orders found for this user")
        }
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
