//! Shared types for Warden

pub mod error;
pub mod response;

pub use error::{Result, WardenError, MISSING_AUTHORIZATION};
pub use response::ApiResponse;
