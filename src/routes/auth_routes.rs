//! HTTP Routes for Authentication
//!
//! - POST /auth/register     - Create a credential
//! - POST /auth/login        - Authenticate and get a token pair
//! - POST /auth/refresh      - Exchange a refresh token for a new pair
//! - GET  /auth/verify-token - Inspect a token passed as `?token=`
//! - GET  /auth/me           - Identity behind the bearer token
//! - GET  /auth/admin-only   - Same, restricted to administrators
//! - GET  /auth/public       - Reachable without credentials
//!
//! Everything under `/auth/` is public to the gate, so handlers that need an
//! identity resolve it through the security dependencies.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::auth::{Claims, PasswordHasher, Role, TokenData, TokenInput, TokenPair};
use crate::routes::{ok_response, parse_json_body, parse_query, success_response};
use crate::server::AppState;
use crate::store::{new_subject_id, StoredCredential};
use crate::types::{Result, WardenError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Patient
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub token_valid: bool,
    pub is_expired: bool,
    pub payload: Claims,
}

impl From<&TokenData> for UserSummary {
    fn from(identity: &TokenData) -> Self {
        Self {
            id: identity.subject_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
///
/// Self-service registration is limited to patients and clinicians;
/// administrative and service accounts are provisioned elsewhere.
pub async fn handle_register(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let body: RegisterRequest = parse_json_body(req).await?;

    let email = body.email.trim().to_string();
    validate_email(&email)?;

    let max = state.security.passwords().policy().max_password_length;
    validate_password(&body.password, max)?;

    if matches!(body.role, Role::Admin | Role::HospitalService) {
        return Err(WardenError::Forbidden(format!(
            "Role {} cannot self-register",
            body.role
        )));
    }

    let password_hash = hash_blocking(state.security.passwords(), body.password).await?;
    let credential = StoredCredential {
        subject_id: new_subject_id(),
        email,
        password_hash,
        role: body.role,
        active: true,
    };
    let summary = UserSummary {
        id: credential.subject_id.clone(),
        email: credential.email.clone(),
        role: credential.role,
    };

    state.store.insert(credential).await?;
    info!(subject = %summary.id, role = %summary.role, "User registered");

    success_response(StatusCode::CREATED, "User registered", &summary)
}

/// POST /auth/login
///
/// Unknown email, inactive account and wrong password all produce the same
/// response and cost one hash verification each.
pub async fn handle_login(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let body: LoginRequest = parse_json_body(req).await?;

    if body.email.is_empty() || body.password.is_empty() {
        return Err(WardenError::Malformed(
            "Missing required fields: email, password".into(),
        ));
    }

    let stored = state
        .store
        .find_by_email(&body.email)
        .await?
        .filter(|c| c.active);

    let hash = match &stored {
        Some(credential) => credential.password_hash.clone(),
        None => state.dummy_hash.clone(),
    };
    let passwords = Arc::clone(state.security.passwords());
    let password = body.password;
    let (valid, password) = tokio::task::spawn_blocking(move || {
        let valid = passwords.verify(&password, &hash);
        (valid, password)
    })
    .await
    .map_err(|e| WardenError::Internal(format!("Password verification task failed: {}", e)))?;

    let credential = match stored {
        Some(credential) if valid => credential,
        _ => {
            warn!(email = %body.email, "Login failed");
            return Err(WardenError::Unauthenticated(INVALID_CREDENTIALS.into()));
        }
    };

    if state.security.passwords().needs_rehash(&credential.password_hash) {
        upgrade_hash(state, &credential.subject_id, password).await;
    }

    let identity = TokenInput {
        subject_id: credential.subject_id.clone(),
        email: credential.email.clone(),
        role: credential.role,
    };
    let tokens = state.security.tokens().issue_pair(&identity)?;

    info!(subject = %credential.subject_id, role = %credential.role, "Login successful");

    ok_response(
        "Login successful",
        &LoginResponse {
            tokens,
            user: UserSummary {
                id: credential.subject_id,
                email: credential.email,
                role: credential.role,
            },
        },
    )
}

/// POST /auth/refresh
pub async fn handle_refresh(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let body: RefreshRequest = parse_json_body(req).await?;
    let tokens = state.security.tokens().refresh(&body.refresh_token)?;
    ok_response("Token refreshed", &tokens)
}

/// GET /auth/verify-token?token=...
pub fn handle_verify_token(
    state: &AppState,
    req: &Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let query: VerifyQuery = parse_query(req)?;
    let tokens = state.security.tokens();

    let payload = tokens.verify(&query.token)?;
    let response = VerifyResponse {
        token_valid: true,
        is_expired: tokens.is_expired(&query.token),
        payload,
    };
    ok_response("Token verified", &response)
}

/// GET /auth/me
pub fn handle_me(state: &AppState, req: &Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let identity = state.security.auth_dependency().resolve(req)?;
    ok_response("Authenticated", &UserSummary::from(&identity))
}

/// GET /auth/admin-only
pub fn handle_admin_only(
    state: &AppState,
    req: &Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let identity = state
        .security
        .role_dependency([Role::Admin])
        .resolve(req)?;
    ok_response("Administrator access granted", &UserSummary::from(&identity))
}

/// GET /auth/public
pub fn handle_public() -> Result<Response<Full<Bytes>>> {
    ok_response(
        "Public route reachable without authentication",
        &serde_json::json!({ "public": true }),
    )
}

// =============================================================================
// Helpers
// =============================================================================

async fn hash_blocking(passwords: &Arc<PasswordHasher>, password: String) -> Result<String> {
    let passwords = Arc::clone(passwords);
    tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| WardenError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Re-hash under the current policy. Failure only costs the upgrade.
async fn upgrade_hash(state: &AppState, subject_id: &str, password: String) {
    let result = match hash_blocking(state.security.passwords(), password).await {
        Ok(hash) => state.store.update_hash(subject_id, hash).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => info!(subject = %subject_id, "Password hash upgraded"),
        Err(e) => warn!(subject = %subject_id, error = %e, "Password hash upgrade failed"),
    }
}

/// Validate an email address
fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(email) {
        return Err(WardenError::Malformed("Invalid email format".into()));
    }
    Ok(())
}

/// Length bounds plus one character from each class
fn validate_password(password: &str, max_length: usize) -> Result<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(WardenError::Malformed(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if length > max_length {
        return Err(WardenError::Malformed(format!(
            "Password must be at most {} characters",
            max_length
        )));
    }

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if !(has_uppercase && has_lowercase && has_digit && has_special) {
        return Err(WardenError::Malformed(
            "Password must contain an uppercase letter, a lowercase letter, a digit and a special character".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("jane.doe+ward@hospital.example").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("@b.com").is_err());
        assert!(validate_email("a b@c.com").is_err());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email(&format!("{}@b.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_validate_password_strength() {
        assert!(validate_password("Correct.Horse.9", 50).is_ok());
        assert!(validate_password("aB3!aB3!", 50).is_ok());

        for weak in [
            "aaaaaaaa",
            "correct.horse.9",
            "CORRECT.HORSE.9",
            "Correct.Horse",
            "CorrectHorse9",
            // '-' is not in the special set
            "Correct-Horse-9",
        ] {
            assert!(
                matches!(validate_password(weak, 50), Err(WardenError::Malformed(_))),
                "{weak} accepted"
            );
        }

        assert!(validate_password("aB3!", 50).is_err());
        assert!(validate_password("Correct.Horse.9", 10).is_err());
    }

    #[test]
    fn test_register_request_defaults_to_patient() {
        let body: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@b.com","password":"longenough"}"#).unwrap();
        assert_eq!(body.role, Role::Patient);

        let body: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.com","password":"longenough","role":"CLINICIAN"}"#,
        )
        .unwrap();
        assert_eq!(body.role, Role::Clinician);
    }
}
