//! Health check endpoint
//!
//! Liveness only: returns 200 whenever the process is serving. Reports which
//! algorithms the security components ended up with, so a degraded password
//! hasher is visible from outside.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service: String,
    pub version: &'static str,
    pub timestamp: String,
    pub mode: &'static str,
    pub components: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    /// Token signing algorithm
    pub tokens: String,
    /// Active password hashing algorithm
    pub password_hasher: String,
    /// Number of services with a configured API key
    pub service_keys: usize,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let security = &state.security;

    HealthResponse {
        healthy: true,
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.dev_mode { "development" } else { "production" },
        components: ComponentHealth {
            tokens: format!("{:?}", security.tokens().policy().algorithm),
            password_hasher: security.passwords().algorithm().to_string(),
            service_keys: security.service_keys().services().count(),
        },
    }
}

/// GET /health
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(&build_health_response(state))
        .unwrap_or_else(|_| r#"{"healthy":true}"#.to_string());

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
