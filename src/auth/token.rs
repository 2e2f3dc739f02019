//! Signed session tokens
//!
//! Access and refresh tokens are JWTs signed with a symmetric HMAC secret.
//! Claims on the wire: `user_id`, `email`, `role`, `iat`, `exp`, `type`.
//!
//! Security notes:
//! - Expiry is checked inside `verify` against the injected clock, with no
//!   leeway: a token is expired iff `now > exp`
//! - There is no revocation list; expiry is the only way a token ends
//! - A configured secret must be at least 32 bytes

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::roles::Role;
use crate::types::{Result, WardenError};

pub const MIN_SECRET_LENGTH: usize = 32;
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Payload stored in the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    #[serde(rename = "user_id", default)]
    pub subject_id: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl Claims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        from_timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        from_timestamp(self.exp)
    }
}

/// Identity fields supplied by the login flow when issuing tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInput {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
}

impl From<&Claims> for TokenInput {
    fn from(claims: &Claims) -> Self {
        Self {
            subject_id: claims.subject_id.clone(),
            email: claims.email.clone(),
            role: claims.role,
        }
    }
}

/// Identity resolved from a verified access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenData {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Access and refresh token issued together at login or refresh time
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Token lifetimes and algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }
}

/// Parse an HMAC algorithm name. Asymmetric algorithms are refused because
/// the service only holds a shared secret.
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    let algorithm = Algorithm::from_str(name.trim())
        .map_err(|_| WardenError::Config(format!("Unknown JWT algorithm: {}", name)))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(WardenError::Config(format!(
            "JWT algorithm {:?} is not an HMAC algorithm",
            other
        ))),
    }
}

/// Token issuer and verifier
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<Zeroizing<Vec<u8>>>,
    policy: TokenPolicy,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a new token service
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: impl Into<Vec<u8>>, policy: TokenPolicy) -> Result<Self> {
        Self::with_clock(secret, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        secret: impl Into<Vec<u8>>,
        policy: TokenPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());

        if secret.is_empty() {
            return Err(WardenError::Config("JWT_SECRET_KEY is required".into()));
        }

        if secret.len() < MIN_SECRET_LENGTH {
            return Err(WardenError::Config(format!(
                "JWT_SECRET_KEY must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        if policy.access_ttl <= Duration::zero() || policy.refresh_ttl <= Duration::zero() {
            return Err(WardenError::Config("Token lifetimes must be positive".into()));
        }

        Ok(Self {
            secret: Arc::new(secret),
            policy,
            clock,
        })
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    pub fn issue_access(&self, input: &TokenInput) -> Result<String> {
        self.issue(input, TokenKind::Access, self.policy.access_ttl)
    }

    pub fn issue_refresh(&self, input: &TokenInput) -> Result<String> {
        self.issue(input, TokenKind::Refresh, self.policy.refresh_ttl)
    }

    /// Issue an access + refresh pair for a freshly authenticated subject
    pub fn issue_pair(&self, input: &TokenInput) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(input)?,
            refresh_token: self.issue_refresh(input)?,
            token_type: "bearer",
            expires_in: self.policy.access_ttl.num_seconds(),
        })
    }

    fn issue(&self, input: &TokenInput, kind: TokenKind, ttl: Duration) -> Result<String> {
        let now = self.clock.timestamp();

        let claims = Claims {
            subject_id: input.subject_id.clone(),
            email: input.email.clone(),
            role: input.role,
            iat: now,
            exp: now + ttl.num_seconds(),
            kind,
        };

        encode(
            &Header::new(self.policy.algorithm),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| WardenError::Internal(format!("Failed to sign {} token: {}", kind, e)))
    }

    /// Verify signature and expiry, then check required claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let claims = self.decode_signed(token)?;

        if claims.exp < self.clock.timestamp() {
            return Err(WardenError::Unauthenticated("Token expired".into()));
        }

        if claims.subject_id.is_empty() || claims.email.is_empty() {
            return Err(WardenError::Unauthenticated(
                "Token missing required claims".into(),
            ));
        }

        Ok(claims)
    }

    /// Whether the token is past its expiry. Undecodable tokens count as expired.
    pub fn is_expired(&self, token: &str) -> bool {
        match self.decode_signed(token) {
            Ok(claims) => self.clock.timestamp() > claims.exp,
            Err(e) => {
                debug!(error = %e, "Token undecodable, treating as expired");
                true
            }
        }
    }

    /// Resolve the identity carried by an access token
    pub fn get_current_identity(&self, token: &str) -> Result<TokenData> {
        if self.is_expired(token) {
            return Err(WardenError::Unauthenticated("Token expired".into()));
        }

        let claims = self.verify(token)?;

        if claims.kind != TokenKind::Access {
            return Err(WardenError::Unauthenticated(format!(
                "Expected access token, got {} token",
                claims.kind
            )));
        }

        Ok(TokenData {
            expires_at: claims.expires_at(),
            subject_id: claims.subject_id,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Exchange a refresh token for a new token pair
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.verify(refresh_token)?;

        if claims.kind != TokenKind::Refresh {
            return Err(WardenError::Unauthenticated(format!(
                "Expected refresh token, got {} token",
                claims.kind
            )));
        }

        self.issue_pair(&TokenInput::from(&claims))
    }

    /// Signature and structure check only. Expiry is left to the caller,
    /// which is always `verify` or `is_expired` in this module.
    fn decode_signed(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.policy.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match err.kind() {
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidAlgorithm => "Invalid algorithm",
                    ErrorKind::MissingRequiredClaim(_) => "Token missing required claims",
                    ErrorKind::Json(_) => "Invalid token claims",
                    _ => "Token validation failed",
                };
                WardenError::Unauthenticated(reason.into())
            })
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
