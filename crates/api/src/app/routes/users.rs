use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::delete,
    Json, Router,
};
use serde_json::json;

use stockroom_core::UserId;

use crate::app::services::AppServices;
use crate::app::errors;
use crate::middleware::admin_only;

pub fn router() -> Router {
    Router::new()
        .route("/:id", delete(delete_user))
        .route_layer(axum::middleware::from_fn(admin_only))
}

/// Delete an account and every order it owns, putting reserved stock back.
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match id.trim().parse() {
        Ok(v) => v,
        Err(_) => return errors::bad_request(format!("invalid user ID: {id}")),
    };

    match services.accounts.delete_account(user_id).await {
        Ok(report) => Json(json!({
            "success": true,
            "message": format!(
                "User and {} associated orders deleted successfully",
                report.orders_deleted
            ),
            "restoredInventory": true,
            "restoredOrders": report.orders_restored,
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
