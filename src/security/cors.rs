//! CORS handling for services mounted behind the gate

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderMap, HeaderValue, ORIGIN, VARY};
use hyper::{Response, StatusCode};

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Authorization, Content-Type, X-API-Key";

/// Allowed origins. `*` allows every origin; credentials are still permitted
/// by echoing the caller's origin back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    origins: Vec<String>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::allow_any()
    }
}

impl CorsPolicy {
    pub fn new(origins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let origins: Vec<String> = origins.into_iter().map(Into::into).collect();
        if origins.is_empty() {
            return Self::allow_any();
        }
        Self { origins }
    }

    pub fn allow_any() -> Self {
        Self {
            origins: vec!["*".into()],
        }
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    fn allows_any(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }

    /// Value for Access-Control-Allow-Origin, if the origin is allowed
    pub fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        match origin {
            Some(origin) if self.allows_any() || self.origins.iter().any(|o| o == origin) => {
                Some(origin.to_string())
            }
            Some(_) => None,
            None if self.allows_any() => Some("*".into()),
            None => None,
        }
    }

    /// Add CORS response headers for a request carrying `request_headers`
    pub fn decorate(&self, request_headers: &HeaderMap, response_headers: &mut HeaderMap) {
        let origin = request_headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        let Some(allowed) = self.allowed_origin(origin) else {
            return;
        };
        let Ok(value) = HeaderValue::from_str(&allowed) else {
            return;
        };

        response_headers.insert("Access-Control-Allow-Origin", value);
        if allowed != "*" {
            response_headers.insert(
                "Access-Control-Allow-Credentials",
                HeaderValue::from_static("true"),
            );
            response_headers.append(VARY, HeaderValue::from_static("Origin"));
        }
    }

    /// Response to an OPTIONS preflight
    pub fn preflight(&self, request_headers: &HeaderMap) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        self.decorate(request_headers, headers);
        if headers.contains_key("Access-Control-Allow-Origin") {
            headers.insert(
                "Access-Control-Allow-Methods",
                HeaderValue::from_static(ALLOW_METHODS),
            );
            headers.insert(
                "Access-Control-Allow-Headers",
                HeaderValue::from_static(ALLOW_HEADERS),
            );
            headers.insert("Access-Control-Max-Age", HeaderValue::from_static("600"));
        }
        response
    }
}
