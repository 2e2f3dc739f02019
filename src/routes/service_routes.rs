//! Service-to-service routes
//!
//! - GET /internal/ping - Echo the calling service's identity
//!
//! These bypass the token gate entirely; the caller proves who it is with
//! the `X-API-Key` header.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;

use crate::routes::{error_response, ok_response};
use crate::server::AppState;
use crate::types::WardenError;

pub const SERVICE_PREFIX: &str = "/internal/";

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub caller: String,
    pub service: String,
}

/// Dispatch a request under `/internal/`
pub async fn handle_service_request<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>> {
    let caller = match state.security.service_key_dependency().resolve(&req) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };

    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/internal/ping") => ok_response(
            "pong",
            &PingResponse {
                caller,
                service: state.service_name.clone(),
            },
        ),
        (_, "/internal/ping") => Ok(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        )),
        _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
    };

    result.unwrap_or_else(WardenError::into_response)
}
