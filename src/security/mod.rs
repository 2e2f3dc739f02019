//! Security composition root
//!
//! `SecurityConfig` builds every auth component from one `SecuritySettings`
//! value and exposes them to a service in two ways: `protect`, which wraps a
//! whole handler, and the per-handler dependencies.

pub mod cors;
pub mod dependencies;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Response};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::auth::{
    Clock, PasswordHasher, RoleSet, ServiceKeyAuthenticator, SystemClock, TokenService,
};
use crate::config::SecuritySettings;
use crate::gate::{AuthGate, RoutePolicy};
use crate::types::Result;

pub use cors::CorsPolicy;
pub use dependencies::{AuthDependency, RoleDependency, ServiceKeyDependency};

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    tokens: Arc<TokenService>,
    passwords: Arc<PasswordHasher>,
    service_keys: Arc<ServiceKeyAuthenticator>,
    routes: Arc<RoutePolicy>,
    gate: Arc<AuthGate>,
    cors: CorsPolicy,
}

impl SecurityConfig {
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Build with an explicit clock for token timestamps
    pub fn with_clock(settings: &SecuritySettings, clock: Arc<dyn Clock>) -> Result<Self> {
        let secret = settings.resolve_secret()?;
        let tokens = Arc::new(TokenService::with_clock(
            secret,
            settings.token_policy,
            clock,
        )?);
        let passwords = Arc::new(PasswordHasher::new(settings.hash_policy)?);
        let service_keys = Arc::new(ServiceKeyAuthenticator::new(
            settings.service_keys.iter().cloned(),
            settings.service_call_timeout,
        )?);
        let routes = Arc::new(
            RoutePolicy::new(settings.public_paths.iter().cloned())
                .with_rules(settings.role_rules.iter().cloned()),
        );
        let gate = Arc::new(AuthGate::new(Arc::clone(&tokens), Arc::clone(&routes)));

        info!(
            algorithm = ?settings.token_policy.algorithm,
            hasher = %passwords.algorithm(),
            services = service_keys.services().count(),
            public_prefixes = routes.public_prefixes().len(),
            "Security configured"
        );

        Ok(Self {
            tokens,
            passwords,
            service_keys,
            routes,
            gate,
            cors: CorsPolicy::new(settings.cors_origins.iter().cloned()),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn passwords(&self) -> &Arc<PasswordHasher> {
        &self.passwords
    }

    pub fn service_keys(&self) -> &Arc<ServiceKeyAuthenticator> {
        &self.service_keys
    }

    pub fn routes(&self) -> &RoutePolicy {
        &self.routes
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    pub fn auth_dependency(&self) -> AuthDependency {
        AuthDependency::new(Arc::clone(&self.tokens))
    }

    pub fn role_dependency(&self, roles: impl Into<RoleSet>) -> RoleDependency {
        RoleDependency::new(self.auth_dependency(), roles.into())
    }

    pub fn service_key_dependency(&self) -> ServiceKeyDependency {
        ServiceKeyDependency::new(Arc::clone(&self.service_keys))
    }

    /// Run `handler` behind the gate
    ///
    /// Preflight requests are answered directly. Everything else must pass
    /// the gate; rejections come back as the error envelope. CORS headers
    /// are added to every response, rejections included.
    pub async fn protect<B, F, Fut>(&self, mut req: Request<B>, handler: F) -> Response<Full<Bytes>>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response<Full<Bytes>>>,
    {
        if req.method() == Method::OPTIONS {
            return self.cors.preflight(req.headers());
        }

        let request_headers = req.headers().clone();
        let mut response = match self.gate.authorize(&mut req) {
            Ok(_) => handler(req).await,
            Err(e) => e.into_response(),
        };
        self.cors.decorate(&request_headers, response.headers_mut());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TokenInput};
    use crate::gate::{current_identity, RoleRule};
    use crate::auth::password::HashPolicy;
    use hyper::StatusCode;

    fn settings() -> SecuritySettings {
        SecuritySettings {
            jwt_secret: Some("security-config-test-secret-0123456789".into()),
            hash_policy: HashPolicy {
                work_factor: 1,
                memory_kib: 1024,
                max_password_length: 50,
            },
            service_keys: vec![
                ("medical-service".into(), "medical-key".into()),
                ("ml-service".into(), "ml-key".into()),
            ],
            role_rules: vec![RoleRule {
                prefix: "/admin".into(),
                roles: RoleSet::from([Role::Admin]),
            }],
            cors_origins: vec!["https://app.example".into()],
            ..SecuritySettings::default()
        }
    }

    fn bearer(config: &SecurityConfig, role: Role) -> String {
        let token = config
            .tokens()
            .issue_access(&TokenInput {
                subject_id: "u1".into(),
                email: "a@b.com".into(),
                role,
            })
            .unwrap();
        format!("Bearer {}", token)
    }

    async fn ok_handler(req: Request<()>) -> Response<Full<Bytes>> {
        let who = current_identity(&req)
            .map(|i| i.subject_id.clone())
            .unwrap_or_else(|| "anonymous".into());
        Response::new(Full::new(Bytes::from(who)))
    }

    #[test]
    fn test_missing_secret_in_production() {
        let settings = SecuritySettings {
            jwt_secret: None,
            ..settings()
        };
        assert!(SecurityConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_duplicate_service_keys_rejected() {
        let settings = SecuritySettings {
            service_keys: vec![
                ("medical-service".into(), "same".into()),
                ("ml-service".into(), "same".into()),
            ],
            ..settings()
        };
        assert!(SecurityConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_dependencies() {
        let config = SecurityConfig::from_settings(&settings()).unwrap();

        let req = Request::builder()
            .uri("/auth/me")
            .header("Authorization", bearer(&config, Role::Patient))
            .body(())
            .unwrap();
        assert_eq!(config.auth_dependency().resolve(&req).unwrap().role, Role::Patient);
        assert!(matches!(
            config.role_dependency([Role::Admin]).resolve(&req),
            Err(crate::types::WardenError::Forbidden(_))
        ));
        assert!(config
            .role_dependency([Role::Admin, Role::Patient])
            .resolve(&req)
            .is_ok());

        let anonymous = Request::builder().uri("/auth/me").body(()).unwrap();
        assert!(matches!(
            config.auth_dependency().resolve(&anonymous),
            Err(crate::types::WardenError::Unauthenticated(_))
        ));

        let service = Request::builder()
            .uri("/internal/ping")
            .header("X-API-Key", "ml-key")
            .body(())
            .unwrap();
        assert_eq!(
            config.service_key_dependency().resolve(&service).unwrap(),
            "ml-service"
        );
    }

    #[tokio::test]
    async fn test_protect_flow() {
        let config = SecurityConfig::from_settings(&settings()).unwrap();

        // Public
        let req = Request::builder().uri("/health").body(()).unwrap();
        let response = config.protect(req, ok_handler).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Protected without credentials
        let req = Request::builder()
            .uri("/records")
            .header("Origin", "https://app.example")
            .body(())
            .unwrap();
        let response = config.protect(req, ok_handler).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["Access-Control-Allow-Origin"],
            "https://app.example"
        );

        // Wrong role
        let req = Request::builder()
            .uri("/admin/users")
            .header("Authorization", bearer(&config, Role::Clinician))
            .body(())
            .unwrap();
        let response = config.protect(req, ok_handler).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Right role
        let req = Request::builder()
            .uri("/admin/users")
            .header("Authorization", bearer(&config, Role::Admin))
            .body(())
            .unwrap();
        let response = config.protect(req, ok_handler).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_preflight_skips_gate() {
        let config = SecurityConfig::from_settings(&settings()).unwrap();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/admin/users")
            .header("Origin", "https://app.example")
            .body(())
            .unwrap();
        let response = config.protect(req, ok_handler).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
