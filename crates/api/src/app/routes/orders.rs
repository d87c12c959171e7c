use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde_json::json;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;
use crate::middleware::admin_only;

pub fn router() -> Router {
    let admin = Router::new()
        .route("/admin", get(list_all_orders))
        .route(
            "/admin/cancel/:id",
            patch(cancel_order).put(cancel_order),
        )
        .route("/:id/status", put(update_order_status))
        .route_layer(axum::middleware::from_fn(admin_only));

    Router::new()
        .route("/", post(create_order))
        .route("/my-orders", get(my_orders))
        .route("/:id", get(get_order))
        .merge(admin)
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let command = match body.into_command(principal.user_id()) {
        Ok(c) => c,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.orders.create_order(command).await {
        Ok(order) => (
            StatusCode::CREATED,
            Json(json!({"success": true, "order": dto::order_to_json(&order)})),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn my_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.orders.orders_for_user(principal.principal()).await {
        Ok(orders) => Json(json!({
            "success": true,
            "count": orders.len(),
            "orders": dto::orders_to_json(&orders),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.orders.get_order(principal.principal(), order_id).await {
        Ok(order) => {
            Json(json!({"success": true, "order": dto::order_to_json(&order)})).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_all_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::ListOrdersQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.orders.list_orders(principal.principal(), filter).await {
        Ok(page) => Json(dto::order_page_to_json(&page)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelOrderRequest>>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e.into()),
    };
    let reason = body.and_then(|Json(b)| b.reason);

    match services.orders.cancel_order(order_id, reason).await {
        Ok(receipt) => {
            let message = if receipt.stock_restored {
                "Order cancelled successfully and inventory restored"
            } else {
                "Order cancelled successfully"
            };
            Json(json!({
                "success": true,
                "message": message,
                "order": dto::order_to_json(&receipt.order),
            }))
            .into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_order_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e.into()),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let target = match body.target() {
        Ok(t) => t,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.orders.update_status(order_id, target).await {
        Ok(order) => {
            Json(json!({"success": true, "order": dto::order_to_json(&order)})).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
