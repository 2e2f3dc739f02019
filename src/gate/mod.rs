//! Request authentication gate
//!
//! Every inbound request runs through an ordered pipeline of interceptors:
//!
//! 1. `PathGuard`      - reject dot-segment paths
//! 2. `PublicRoutes`   - public prefix ⇒ allow without credentials
//! 3. `BearerExtractor`- require `Authorization: Bearer <token>`
//! 4. `TokenVerifier`  - resolve the token into an identity
//! 5. `RoleGuard`      - enforce per-prefix role rules
//!
//! Any interceptor may short-circuit with `Flow::Allow` or an error. A
//! pipeline that runs to completion without producing an identity denies the
//! request. The resolved identity is stored in the request's extensions for
//! downstream handlers.

pub mod interceptors;
pub mod routes;

use hyper::{HeaderMap, Method, Request};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{TokenData, TokenService};
use crate::types::{Result, WardenError, MISSING_AUTHORIZATION};

pub use interceptors::{
    extract_bearer, BearerExtractor, PathGuard, PublicRoutes, RoleGuard, TokenVerifier,
};
pub use routes::{parse_role_rules, RoleRule, RoutePolicy, DEFAULT_PUBLIC_PATHS};

/// The parts of a request the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    pub fn of<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            path: req.uri().path(),
            headers: req.headers(),
        }
    }

    /// Header value as UTF-8; non-UTF-8 values read as absent
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// State threaded through the interceptors for one request
#[derive(Debug)]
pub struct Exchange<'a> {
    pub head: RequestHead<'a>,
    pub token: Option<String>,
    pub identity: Option<TokenData>,
}

/// Interceptor verdict when it does not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hand over to the next interceptor
    Continue,
    /// Stop and let the request through
    Allow,
}

pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, exchange: &mut Exchange<'_>) -> Result<Flow>;
}

/// Outcome of a gate pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated(TokenData),
}

impl Access {
    pub fn identity(&self) -> Option<&TokenData> {
        match self {
            Access::Public => None,
            Access::Authenticated(identity) => Some(identity),
        }
    }
}

pub struct AuthGate {
    pipeline: Vec<Box<dyn Interceptor>>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.pipeline.iter().map(|i| i.name()).collect();
        f.debug_struct("AuthGate").field("pipeline", &names).finish()
    }
}

impl AuthGate {
    /// Standard pipeline over a route policy
    pub fn new(tokens: Arc<TokenService>, policy: Arc<RoutePolicy>) -> Self {
        Self::from_interceptors(vec![
            Box::new(PathGuard),
            Box::new(PublicRoutes::new(Arc::clone(&policy))),
            Box::new(BearerExtractor),
            Box::new(TokenVerifier::new(tokens)),
            Box::new(RoleGuard::new(policy)),
        ])
    }

    pub fn from_interceptors(pipeline: Vec<Box<dyn Interceptor>>) -> Self {
        Self { pipeline }
    }

    /// Decide on a request without touching it
    pub fn evaluate(&self, head: RequestHead<'_>) -> Result<Access> {
        let mut exchange = Exchange {
            head,
            token: None,
            identity: None,
        };

        for interceptor in &self.pipeline {
            match interceptor.intercept(&mut exchange) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Allow) => {
                    debug!(
                        interceptor = interceptor.name(),
                        path = %head.path,
                        "Gate allowed request"
                    );
                    return Ok(match exchange.identity {
                        Some(identity) => Access::Authenticated(identity),
                        None => Access::Public,
                    });
                }
                Err(e) => {
                    debug!(
                        interceptor = interceptor.name(),
                        method = %head.method,
                        path = %head.path,
                        error = %e,
                        "Gate rejected request"
                    );
                    return Err(e);
                }
            }
        }

        match exchange.identity {
            Some(identity) => {
                debug!(subject = %identity.subject_id, role = %identity.role, path = %head.path, "Authenticated");
                Ok(Access::Authenticated(identity))
            }
            None => Err(WardenError::Unauthenticated(MISSING_AUTHORIZATION.into())),
        }
    }

    /// Run the gate and attach the identity to the request's extensions
    pub fn authorize<B>(&self, req: &mut Request<B>) -> Result<Access> {
        let access = self.evaluate(RequestHead::of(req))?;
        if let Access::Authenticated(identity) = &access {
            req.extensions_mut().insert(identity.clone());
        }
        Ok(access)
    }
}

/// Identity attached by the gate, if any
pub fn current_identity<B>(req: &Request<B>) -> Option<&TokenData> {
    req.extensions().get::<TokenData>()
}
