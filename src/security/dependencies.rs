//! Per-handler identity resolution
//!
//! A handler asks for what it needs: an authenticated identity, an identity
//! holding one of a set of roles, or a calling service. Each dependency
//! reuses the identity the gate already attached to the request and only
//! inspects headers itself when the handler sits under a public prefix.

use hyper::Request;
use std::sync::Arc;

use crate::auth::{RoleSet, ServiceKeyAuthenticator, TokenData, TokenService, API_KEY_HEADER};
use crate::gate::{current_identity, extract_bearer, RequestHead};
use crate::types::{Result, WardenError, MISSING_AUTHORIZATION};

/// Resolves the caller's identity from a bearer access token
#[derive(Debug, Clone)]
pub struct AuthDependency {
    tokens: Arc<TokenService>,
}

impl AuthDependency {
    pub(crate) fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn resolve<B>(&self, req: &Request<B>) -> Result<TokenData> {
        if let Some(identity) = current_identity(req) {
            return Ok(identity.clone());
        }

        let head = RequestHead::of(req);
        let token = extract_bearer(head.header(hyper::header::AUTHORIZATION.as_str()))
            .ok_or_else(|| WardenError::Unauthenticated(MISSING_AUTHORIZATION.into()))?;
        self.tokens.get_current_identity(token)
    }
}

/// Identity resolution plus role membership
#[derive(Debug, Clone)]
pub struct RoleDependency {
    auth: AuthDependency,
    roles: RoleSet,
}

impl RoleDependency {
    pub(crate) fn new(auth: AuthDependency, roles: RoleSet) -> Self {
        Self { auth, roles }
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn resolve<B>(&self, req: &Request<B>) -> Result<TokenData> {
        let identity = self.auth.resolve(req)?;
        if !self.roles.contains(identity.role) {
            return Err(WardenError::Forbidden(format!(
                "Role {} not in {}",
                identity.role, self.roles
            )));
        }
        Ok(identity)
    }
}

/// Resolves the calling service from its `X-API-Key` header
#[derive(Debug, Clone)]
pub struct ServiceKeyDependency {
    keys: Arc<ServiceKeyAuthenticator>,
}

impl ServiceKeyDependency {
    pub(crate) fn new(keys: Arc<ServiceKeyAuthenticator>) -> Self {
        Self { keys }
    }

    /// Name of the service that owns the presented key
    pub fn resolve<B>(&self, req: &Request<B>) -> Result<String> {
        let presented = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        self.keys.verify_key(presented)
    }
}
