use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, error};

use stockroom_auth::JwtValidator;
use stockroom_infra::Store;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub store: Arc<dyn Store>,
}

/// Validates the bearer token, loads the account it names and attaches a
/// [`PrincipalContext`] to the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(resp) => return resp,
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            return unauthorized("not authorized, token failed");
        }
    };

    let account = match state.store.get_account(claims.sub).await {
        Ok(Some(account)) => account,
        Ok(None) => return unauthorized("not authorized, account no longer exists"),
        Err(e) => {
            error!(error = %e, "account lookup failed during authentication");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "persistence",
                "could not verify credentials",
            );
        }
    };

    req.extensions_mut().insert(PrincipalContext::new(&account));
    next.run(req).await
}

/// Rejects non-administrators with `403`. Must run inside [`auth_middleware`].
pub async fn admin_only(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let Some(principal) = req.extensions().get::<PrincipalContext>() else {
        return unauthorized("not authorized, no token");
    };
    if let Err(e) = principal.principal().require_admin() {
        return json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    next.run(req).await
}

fn unauthorized(message: &'static str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, Response> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("not authorized, no token"))?;

    let header = header
        .to_str()
        .map_err(|_| unauthorized("not authorized, token failed"))?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("not authorized, no token"))?;

    let token = header.trim();
    if token.is_empty() {
        return Err(unauthorized("not authorized, no token"));
    }

    Ok(token)
}
