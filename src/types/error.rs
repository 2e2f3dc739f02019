//! Error types for Warden
//!
//! Every failure the auth core can produce maps onto one of four outcomes a
//! caller cares about: unauthenticated (401), forbidden (403), malformed (400)
//! or an internal failure. The remaining variants describe infrastructure
//! problems around those outcomes (configuration, outbound transport).

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::{debug, error, warn};

use crate::types::response::ApiResponse;

/// Main error type for Warden operations
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Missing, invalid or expired credential
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid identity, insufficient role or invalid service key
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request failed basic validation before reaching auth
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Outbound service call never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound service call was refused by the target's auth layer
    #[error("Upstream rejected credentials with status {status}")]
    UpstreamRejected { status: u16 },
}

impl WardenError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Client-facing message. Never says which check failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "Authentication required",
            Self::Forbidden(_) => "Insufficient permissions",
            Self::Malformed(_) => "Malformed request",
            Self::Internal(_) | Self::Config(_) => "Internal server error",
            Self::Transport(_) | Self::UpstreamRejected { .. } => "Upstream service unavailable",
        }
    }

    /// Client-facing detail line for the `errors` array of the envelope
    fn public_detail(&self) -> String {
        match self {
            // The gate's own "missing authorization" reason is safe to echo;
            // token failures collapse into one line.
            Self::Unauthenticated(reason) if reason == MISSING_AUTHORIZATION => reason.clone(),
            Self::Unauthenticated(_) => "Invalid or expired credentials".into(),
            Self::Forbidden(_) => "Access denied for this resource".into(),
            Self::Malformed(reason) => reason.clone(),
            Self::Internal(_) | Self::Config(_) => "An internal error occurred".into(),
            Self::Transport(_) | Self::UpstreamRejected { .. } => {
                "A dependent service could not be reached".into()
            }
        }
    }

    /// Whether this error is an expected outcome of authentication rather
    /// than a fault
    pub fn is_auth_outcome(&self) -> bool {
        matches!(self, Self::Unauthenticated(_) | Self::Forbidden(_))
    }

    /// Log at the level the error deserves
    pub fn log(&self) {
        match self {
            Self::Unauthenticated(_) | Self::Forbidden(_) | Self::Malformed(_) => {
                debug!(error = %self, "Request rejected")
            }
            Self::Transport(_) | Self::UpstreamRejected { .. } => {
                warn!(error = %self, "Service call failed")
            }
            Self::Internal(_) | Self::Config(_) => error!(error = ?self, "Internal failure"),
        }
    }

    /// Uniform error envelope for this error
    pub fn envelope(&self) -> ApiResponse {
        ApiResponse::error(self.public_message(), vec![self.public_detail()])
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::to_string(&self.envelope())
            .unwrap_or_else(|_| r#"{"success":false,"message":"Internal server error","errors":[]}"#.into());
        (status, body)
    }

    /// Render as a JSON response, logging it on the way out
    pub fn into_response(self) -> Response<Full<Bytes>> {
        self.log();
        let (status, body) = self.into_status_code_and_body();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Reason used when a protected route receives no bearer credential
pub const MISSING_AUTHORIZATION: &str = "missing authorization";

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for WardenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthenticated(format!("JWT error: {}", err))
    }
}

impl From<argon2::password_hash::Error> for WardenError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Internal(format!("Password hashing error: {}", err))
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;
