use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use stockroom_core::Missing;
use stockroom_infra::ServiceError;

/// Map a service failure onto the HTTP status and error body.
///
/// Missing products or sizes are a problem with the request (400); a missing
/// order or account is a missing resource (404).
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::OutOfStock { .. } => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(Missing::Product(_) | Missing::Size { .. }) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::NotFound(Missing::Order(_) | Missing::Account(_)) => StatusCode::NOT_FOUND,
        ServiceError::StateConflict(_) => StatusCode::BAD_REQUEST,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::Persistence(e) => {
            error!(error = %e, "storage failure");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                "server error, please try again",
            );
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation", message)
}
