//! Standard response envelope shared by every service
//!
//! `{success, message, data?, errors?, metadata?, timestamp}`

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            errors: None,
            metadata: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn error(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: Some(errors),
            metadata: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Render as a JSON HTTP response
    pub fn into_response(self, status: StatusCode) -> Response<Full<Bytes>> {
        let json = serde_json::to_string(&self).unwrap_or_else(|_| "{}".to_string());

        let mut response = Response::new(Full::new(Bytes::from(json)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::error("Nope", vec!["detail".into()])).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Nope");
        assert_eq!(body["errors"][0], "detail");
        assert!(body.get("data").is_none());
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_success_envelope_omits_errors() {
        let body = serde_json::to_value(ApiResponse::success(
            "ok",
            Some(serde_json::json!({ "public": true })),
        ))
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["public"], true);
        assert!(body.get("errors").is_none());
    }
}
