//! Authentication primitives for Warden
//!
//! Provides:
//! - Signed access/refresh token issuance and verification
//! - Password hashing with Argon2id, degrading to scrypt
//! - Static API key authentication between services
//! - Closed role enumeration for authorization

pub mod clock;
pub mod password;
pub mod roles;
pub mod service_key;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use password::{HashAlgorithm, HashPolicy, PasswordHasher};
pub use roles::{Role, RoleSet};
pub use service_key::{
    ServiceKeyAuthenticator, ServiceMethod, ServiceResponse, API_KEY_HEADER, KNOWN_SERVICES,
};
pub use token::{
    parse_algorithm, Claims, TokenData, TokenInput, TokenKind, TokenPair, TokenPolicy,
    TokenService,
};
