//! Built-in request interceptors, one per gate step

use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenService;
use crate::gate::routes::{check_path, RoutePolicy};
use crate::gate::{Exchange, Flow, Interceptor};
use crate::types::{Result, WardenError, MISSING_AUTHORIZATION};

/// Rejects paths with dot segments before anything looks at prefixes
pub struct PathGuard;

impl Interceptor for PathGuard {
    fn name(&self) -> &'static str {
        "path-guard"
    }

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        check_path(exchange.head.path)?;
        Ok(Flow::Continue)
    }
}

/// Lets public routes through without credentials
pub struct PublicRoutes {
    policy: Arc<RoutePolicy>,
}

impl PublicRoutes {
    pub fn new(policy: Arc<RoutePolicy>) -> Self {
        Self { policy }
    }
}

impl Interceptor for PublicRoutes {
    fn name(&self) -> &'static str {
        "public-routes"
    }

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        if self.policy.is_public(exchange.head.path) {
            debug!(path = %exchange.head.path, "Public route");
            return Ok(Flow::Allow);
        }
        Ok(Flow::Continue)
    }
}

/// Pulls the bearer token out of the Authorization header
pub struct BearerExtractor;

impl Interceptor for BearerExtractor {
    fn name(&self) -> &'static str {
        "bearer-extractor"
    }

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        let header = exchange.head.header(hyper::header::AUTHORIZATION.as_str());
        match extract_bearer(header) {
            Some(token) => {
                exchange.token = Some(token.to_string());
                Ok(Flow::Continue)
            }
            None => Err(WardenError::Unauthenticated(MISSING_AUTHORIZATION.into())),
        }
    }
}

/// Resolves the extracted token into an identity
pub struct TokenVerifier {
    tokens: Arc<TokenService>,
}

impl TokenVerifier {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl Interceptor for TokenVerifier {
    fn name(&self) -> &'static str {
        "token-verifier"
    }

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        let token = exchange
            .token
            .take()
            .ok_or_else(|| WardenError::Unauthenticated(MISSING_AUTHORIZATION.into()))?;

        let identity = self.tokens.get_current_identity(&token)?;
        exchange.identity = Some(identity);
        Ok(Flow::Continue)
    }
}

/// Enforces the role rules of the route policy
pub struct RoleGuard {
    policy: Arc<RoutePolicy>,
}

impl RoleGuard {
    pub fn new(policy: Arc<RoutePolicy>) -> Self {
        Self { policy }
    }
}

impl Interceptor for RoleGuard {
    fn name(&self) -> &'static str {
        "role-guard"
    }

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        let Some(required) = self.policy.required_roles(exchange.head.path) else {
            return Ok(Flow::Continue);
        };

        match &exchange.identity {
            Some(identity) if required.contains(identity.role) => Ok(Flow::Continue),
            Some(identity) => Err(WardenError::Forbidden(format!(
                "Role {} not in {}",
                identity.role, required
            ))),
            None => Err(WardenError::Unauthenticated(MISSING_AUTHORIZATION.into())),
        }
    }
}

/// Extract a token from an `Authorization: Bearer <token>` header.
/// The scheme is case-insensitive; anything else yields None.
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    let (scheme, token) = auth_header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
