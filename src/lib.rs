//! Warden - shared authentication core
//!
//! Signed session tokens, password hashing, a deny-by-default request gate
//! with role checks, and API-key authentication between services. Services
//! build one `SecurityConfig` from `SecuritySettings` at startup and either
//! wrap their handlers with `protect` or resolve identities per handler.

pub mod auth;
pub mod config;
pub mod gate;
pub mod routes;
pub mod security;
pub mod server;
pub mod store;
pub mod types;

pub use config::{Args, SecuritySettings};
pub use security::SecurityConfig;
pub use server::{run, AppState};
pub use types::{ApiResponse, Result, WardenError};
