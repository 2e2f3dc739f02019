//! Service-to-service authentication with static API keys
//!
//! Each service holds one shared secret. The callee maps a presented
//! `X-API-Key` back to the calling service's name; the caller attaches its own
//! key to outbound requests. Token logic is not involved at all.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{Result, WardenError};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Known services in the deployment, in the order their keys are read from
/// the environment
pub const KNOWN_SERVICES: [&str; 6] = [
    "auth-service",
    "users-service",
    "medical-service",
    "ocr-service",
    "ml-service",
    "blockchain-service",
];

/// HTTP methods supported for inter-service calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ServiceMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            ServiceMethod::Get => reqwest::Method::GET,
            ServiceMethod::Post => reqwest::Method::POST,
            ServiceMethod::Put => reqwest::Method::PUT,
            ServiceMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Whether a JSON body is sent with this method
    fn carries_body(&self) -> bool {
        matches!(self, ServiceMethod::Post | ServiceMethod::Put)
    }
}

impl FromStr for ServiceMethod {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(ServiceMethod::Get),
            "POST" => Ok(ServiceMethod::Post),
            "PUT" => Ok(ServiceMethod::Put),
            "DELETE" => Ok(ServiceMethod::Delete),
            other => Err(WardenError::Malformed(format!(
                "Unsupported HTTP method for service call: {}",
                other
            ))),
        }
    }
}

/// Response from another service
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| WardenError::Transport(format!("Invalid JSON from upstream: {}", e)))
    }
}

/// API key verifier and authenticated client for inter-service calls
#[derive(Clone)]
pub struct ServiceKeyAuthenticator {
    /// service name -> shared secret
    keys: BTreeMap<String, String>,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl fmt::Debug for ServiceKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKeyAuthenticator")
            .field("services", &self.keys.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ServiceKeyAuthenticator {
    /// Create an authenticator from a service name -> key mapping
    ///
    /// Empty keys are dropped. Two services sharing one key is rejected, since
    /// a presented key must identify exactly one caller.
    pub fn new(
        keys: impl IntoIterator<Item = (String, String)>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (service, key) in keys {
            if key.is_empty() {
                continue;
            }
            if let Some((other, _)) = map.iter().find(|(_, existing)| **existing == key) {
                return Err(WardenError::Config(format!(
                    "Services {} and {} share the same API key",
                    other, service
                )));
            }
            map.insert(service, key);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WardenError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            keys: map,
            http_client,
            timeout,
        })
    }

    /// Check if any service key is configured
    pub fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Key this instance presents when acting as `service`
    pub fn key_for(&self, service: &str) -> Option<&str> {
        self.keys.get(service).map(String::as_str)
    }

    /// Resolve a presented API key to the calling service's name
    ///
    /// Every configured key is compared so timing does not depend on which
    /// entry matched.
    pub fn verify_key(&self, presented: Option<&str>) -> Result<String> {
        let presented = match Self::extract_from_header(presented) {
            Some(key) => key,
            None => return Err(WardenError::Forbidden("Missing service API key".into())),
        };

        let mut matched: Option<&String> = None;
        for (service, key) in &self.keys {
            if constant_time_compare(presented, key) {
                matched = Some(service);
            }
        }

        match matched {
            Some(service) => {
                debug!(service = %service, "Service API key accepted");
                Ok(service.clone())
            }
            None => Err(WardenError::Forbidden(
                "Invalid API key for service access".into(),
            )),
        }
    }

    /// Extract API key from request headers
    pub fn extract_from_header(header: Option<&str>) -> Option<&str> {
        header.filter(|h| !h.is_empty())
    }

    /// Call another service with this instance's key for `acting_as`
    ///
    /// Transport problems (connect, timeout, body) come back as
    /// `Transport`; a 401/403 from the target as `UpstreamRejected`. Every
    /// other status is handed to the caller.
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        base_url: &str,
        path: &str,
        method: ServiceMethod,
        body: Option<&B>,
        acting_as: &str,
    ) -> Result<ServiceResponse> {
        let key = self.key_for(acting_as).ok_or_else(|| {
            WardenError::Config(format!("No API key configured for service {}", acting_as))
        })?;

        let url = join_url(base_url, path);
        debug!(%url, ?method, service = %acting_as, "Calling service");

        let mut request = self
            .http_client
            .request(method.as_reqwest(), &url)
            .header(API_KEY_HEADER, key)
            .timeout(self.timeout);

        if method.carries_body() {
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            warn!(%url, status, service = %acting_as, "Service call rejected by target");
            return Err(WardenError::UpstreamRejected { status });
        }

        let body = response.bytes().await?;
        Ok(ServiceResponse { status, body })
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
