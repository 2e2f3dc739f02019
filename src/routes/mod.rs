//! HTTP routes for the reference server
//!
//! `dispatch` runs after the gate has accepted the request. Service routes
//! under `/internal/` are reached without the gate and authenticate with
//! `X-API-Key` instead.

pub mod auth_routes;
pub mod health;
pub mod service_routes;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::gate::current_identity;
use crate::server::AppState;
use crate::types::{ApiResponse, Result, WardenError};

pub use service_routes::{handle_service_request, SERVICE_PREFIX};

/// Largest JSON body accepted by any route
const MAX_BODY_BYTES: usize = 10240;

/// Dispatch a request that passed the gate
pub async fn dispatch(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();

    let result = match (req.method().clone(), path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => Ok(health::health_check(&state)),

        (Method::POST, "/auth/register") => auth_routes::handle_register(&state, req).await,
        (Method::POST, "/auth/login") => auth_routes::handle_login(&state, req).await,
        (Method::POST, "/auth/refresh") => auth_routes::handle_refresh(&state, req).await,
        (Method::GET, "/auth/verify-token") => auth_routes::handle_verify_token(&state, &req),
        (Method::GET, "/auth/me") => auth_routes::handle_me(&state, &req),
        (Method::GET, "/auth/admin-only") => auth_routes::handle_admin_only(&state, &req),
        (Method::GET, "/auth/public") => auth_routes::handle_public(),

        // Protected by the gate alone
        (Method::GET, "/profile") => handle_profile(&req),

        (_, "/auth/register")
        | (_, "/auth/login")
        | (_, "/auth/refresh")
        | (_, "/auth/verify-token")
        | (_, "/auth/me")
        | (_, "/auth/admin-only") => Ok(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        )),

        _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
    };

    result.unwrap_or_else(WardenError::into_response)
}

/// GET /profile
///
/// Identity attached by the gate
fn handle_profile(req: &Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let identity = current_identity(req)
        .ok_or_else(|| WardenError::Internal("Gate attached no identity".into()))?;
    ok_response("Profile", identity)
}

// =============================================================================
// Response Helpers
// =============================================================================

pub(crate) fn ok_response<T: Serialize + ?Sized>(
    message: &str,
    data: &T,
) -> Result<Response<Full<Bytes>>> {
    success_response(StatusCode::OK, message, data)
}

pub(crate) fn success_response<T: Serialize + ?Sized>(
    status: StatusCode,
    message: &str,
    data: &T,
) -> Result<Response<Full<Bytes>>> {
    let data = serde_json::to_value(data)
        .map_err(|e| WardenError::Internal(format!("Failed to serialize response: {}", e)))?;
    Ok(ApiResponse::success(message, Some(data)).into_response(status))
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    ApiResponse::error(message, vec![message.to_string()]).into_response(status)
}

// =============================================================================
// Request Helpers
// =============================================================================

pub(crate) async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| WardenError::Malformed(format!("Failed to read body: {}", e)))?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| WardenError::Malformed(format!("Invalid JSON: {}", e)))
}

pub(crate) fn parse_query<T: DeserializeOwned, B>(req: &Request<B>) -> Result<T> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| WardenError::Malformed(format!("Invalid query: {}", e)))
}
