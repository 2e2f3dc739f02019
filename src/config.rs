//! Configuration for Warden
//!
//! CLI arguments and environment variable handling using clap. `Args` is the
//! raw surface; `SecuritySettings` is the validated, immutable value every
//! component is constructed from.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use clap::{Parser, ValueEnum};
use rand::RngCore;
use std::net::SocketAddr;
use tracing::warn;

use crate::auth::password::{HashPolicy, DEFAULT_MAX_PASSWORD_LENGTH, DEFAULT_MEMORY_KIB, DEFAULT_WORK_FACTOR};
use crate::auth::service_key::DEFAULT_CALL_TIMEOUT_SECS;
use crate::auth::token::{parse_algorithm, TokenPolicy};
use crate::gate::{parse_role_rules, RoleRule, DEFAULT_PUBLIC_PATHS};
use crate::types::{Result, WardenError};

/// Warden - shared authentication core for the hospital services
#[derive(Parser, Debug, Clone)]
#[command(name = "warden")]
#[command(about = "Authentication gate, token issuer and service-key verifier")]
pub struct Args {
    /// Name this instance acts as for outbound service calls
    #[arg(long, env = "SERVICE_NAME", default_value = "auth-service")]
    pub service_name: String,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8001")]
    pub listen: SocketAddr,

    /// Enable development mode (ephemeral signing secret, demo users allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Token configuration
    #[command(flatten)]
    pub jwt: JwtArgs,

    /// Password hashing configuration
    #[command(flatten)]
    pub hashing: HashArgs,

    /// Per-service API keys
    #[command(flatten)]
    pub service_keys: ServiceKeyArgs,

    /// Timeout for outbound service calls, in seconds
    #[arg(long, env = "SERVICE_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub service_call_timeout_secs: u64,

    /// Comma-separated public path prefixes (defaults to health/docs/auth)
    #[arg(long, env = "PUBLIC_PATHS", value_delimiter = ',')]
    pub public_paths: Vec<String>,

    /// Role rules, e.g. `/admin=ADMIN;/medical=CLINICIAN|ADMIN`
    #[arg(long, env = "ROUTE_ROLES")]
    pub route_roles: Option<String>,

    /// Allowed CORS origins as a JSON list
    #[arg(long, env = "CORS_ORIGINS", default_value = r#"["*"]"#)]
    pub cors_origins: String,

    /// Seed in-memory demo accounts (dev mode only)
    #[arg(long, env = "SEED_DEMO_USERS", default_value = "false")]
    pub seed_demo_users: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Token signing configuration
#[derive(Parser, Debug, Clone)]
pub struct JwtArgs {
    /// Signing secret (required outside dev mode)
    #[arg(long, env = "JWT_SECRET_KEY")]
    pub jwt_secret_key: Option<String>,

    /// HMAC algorithm (HS256, HS384, HS512)
    #[arg(long, env = "JWT_ALGORITHM", default_value = "HS256")]
    pub jwt_algorithm: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "JWT_ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "30")]
    pub jwt_access_token_expire_minutes: i64,

    /// Refresh token lifetime in days
    #[arg(long, env = "JWT_REFRESH_TOKEN_EXPIRE_DAYS", default_value = "7")]
    pub jwt_refresh_token_expire_days: i64,
}

/// Password hashing configuration
#[derive(Parser, Debug, Clone)]
pub struct HashArgs {
    /// Work factor (Argon2 iterations; scrypt log_n offset)
    #[arg(long, env = "HASH_WORK_FACTOR", default_value_t = DEFAULT_WORK_FACTOR)]
    pub hash_work_factor: u32,

    /// Argon2 memory cost in KiB
    #[arg(long, env = "HASH_MEMORY_KIB", default_value_t = DEFAULT_MEMORY_KIB)]
    pub hash_memory_kib: u32,

    /// Passwords are truncated to this many characters
    #[arg(long, env = "MAX_PASSWORD_LENGTH", default_value_t = DEFAULT_MAX_PASSWORD_LENGTH)]
    pub max_password_length: usize,
}

/// Shared secrets, one per service
#[derive(Parser, Debug, Clone)]
pub struct ServiceKeyArgs {
    #[arg(long, env = "AUTH_SERVICE_API_KEY")]
    pub auth_service_api_key: Option<String>,

    #[arg(long, env = "USERS_SERVICE_API_KEY")]
    pub users_service_api_key: Option<String>,

    #[arg(long, env = "MEDICAL_SERVICE_API_KEY")]
    pub medical_service_api_key: Option<String>,

    #[arg(long, env = "OCR_SERVICE_API_KEY")]
    pub ocr_service_api_key: Option<String>,

    #[arg(long, env = "ML_SERVICE_API_KEY")]
    pub ml_service_api_key: Option<String>,

    #[arg(long, env = "BLOCKCHAIN_SERVICE_API_KEY")]
    pub blockchain_service_api_key: Option<String>,
}

impl ServiceKeyArgs {
    /// Configured (service name, key) pairs
    pub fn pairs(&self) -> Vec<(String, String)> {
        [
            ("auth-service", &self.auth_service_api_key),
            ("users-service", &self.users_service_api_key),
            ("medical-service", &self.medical_service_api_key),
            ("ocr-service", &self.ocr_service_api_key),
            ("ml-service", &self.ml_service_api_key),
            ("blockchain-service", &self.blockchain_service_api_key),
        ]
        .into_iter()
        .filter_map(|(name, key)| key.clone().map(|k| (name.to_string(), k)))
        .collect()
    }
}

/// Validated security configuration, built once at startup
#[derive(Clone)]
pub struct SecuritySettings {
    pub service_name: String,
    pub dev_mode: bool,
    pub jwt_secret: Option<String>,
    pub token_policy: TokenPolicy,
    pub hash_policy: HashPolicy,
    pub service_keys: Vec<(String, String)>,
    pub service_call_timeout: std::time::Duration,
    pub public_paths: Vec<String>,
    pub role_rules: Vec<RoleRule>,
    pub cors_origins: Vec<String>,
}

impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<&str> = self.service_keys.iter().map(|(s, _)| s.as_str()).collect();
        f.debug_struct("SecuritySettings")
            .field("service_name", &self.service_name)
            .field("dev_mode", &self.dev_mode)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_policy", &self.token_policy)
            .field("hash_policy", &self.hash_policy)
            .field("service_keys", &services)
            .field("service_call_timeout", &self.service_call_timeout)
            .field("public_paths", &self.public_paths)
            .field("role_rules", &self.role_rules)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            service_name: "auth-service".into(),
            dev_mode: false,
            jwt_secret: None,
            token_policy: TokenPolicy::default(),
            hash_policy: HashPolicy::default(),
            service_keys: Vec::new(),
            service_call_timeout: std::time::Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            role_rules: Vec::new(),
            cors_origins: vec!["*".into()],
        }
    }
}

impl SecuritySettings {
    /// Signing secret bytes
    ///
    /// Outside dev mode a missing secret is fatal. In dev mode a random
    /// secret is generated; tokens will not survive a restart and will not
    /// verify on other instances.
    pub fn resolve_secret(&self) -> Result<Vec<u8>> {
        match self.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Ok(secret.as_bytes().to_vec()),
            None if self.dev_mode => {
                warn!("JWT_SECRET_KEY not set - generated an ephemeral signing secret (dev mode)");
                Ok(generate_secret().into_bytes())
            }
            None => Err(WardenError::Config(
                "JWT_SECRET_KEY is required in production mode".into(),
            )),
        }
    }
}

/// 64 random bytes, URL-safe base64
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Parse the CORS origin list. Unparseable input allows every origin.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(origins) if !origins.is_empty() => origins,
        Ok(_) => vec!["*".into()],
        Err(e) => {
            warn!(error = %e, "CORS_ORIGINS is not a JSON list, allowing all origins");
            vec!["*".into()]
        }
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt.jwt_secret_key.as_deref().map_or(true, str::is_empty) {
            return Err("JWT_SECRET_KEY is required in production mode".to_string());
        }

        if self.jwt.jwt_access_token_expire_minutes <= 0 {
            return Err("JWT_ACCESS_TOKEN_EXPIRE_MINUTES must be positive".to_string());
        }

        if self.jwt.jwt_refresh_token_expire_days <= 0 {
            return Err("JWT_REFRESH_TOKEN_EXPIRE_DAYS must be positive".to_string());
        }

        if self.service_call_timeout_secs == 0 {
            return Err("SERVICE_CALL_TIMEOUT_SECS must be positive".to_string());
        }

        if self.seed_demo_users && !self.dev_mode {
            return Err("SEED_DEMO_USERS requires DEV_MODE".to_string());
        }

        Ok(())
    }

    /// Build the immutable settings value
    pub fn security_settings(&self) -> Result<SecuritySettings> {
        self.validate().map_err(WardenError::Config)?;

        let access_ttl = Duration::try_minutes(self.jwt.jwt_access_token_expire_minutes)
            .ok_or_else(|| {
                WardenError::Config("JWT_ACCESS_TOKEN_EXPIRE_MINUTES is out of range".into())
            })?;
        let refresh_ttl = Duration::try_days(self.jwt.jwt_refresh_token_expire_days)
            .ok_or_else(|| {
                WardenError::Config("JWT_REFRESH_TOKEN_EXPIRE_DAYS is out of range".into())
            })?;

        let token_policy = TokenPolicy {
            algorithm: parse_algorithm(&self.jwt.jwt_algorithm)?,
            access_ttl,
            refresh_ttl,
        };

        let public_paths: Vec<String> = self
            .public_paths
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let public_paths = if public_paths.is_empty() {
            DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect()
        } else {
            public_paths
        };

        let role_rules = match &self.route_roles {
            Some(rules) => parse_role_rules(rules)?,
            None => Vec::new(),
        };

        Ok(SecuritySettings {
            service_name: self.service_name.clone(),
            dev_mode: self.dev_mode,
            jwt_secret: self.jwt.jwt_secret_key.clone(),
            token_policy,
            hash_policy: HashPolicy {
                work_factor: self.hashing.hash_work_factor,
                memory_kib: self.hashing.hash_memory_kib,
                max_password_length: self.hashing.max_password_length,
            },
            service_keys: self.service_keys.pairs(),
            service_call_timeout: std::time::Duration::from_secs(self.service_call_timeout_secs),
            public_paths,
            role_rules,
            cors_origins: parse_cors_origins(&self.cors_origins),
        })
    }
}
