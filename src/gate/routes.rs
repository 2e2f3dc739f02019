//! Route classification: public prefixes and per-prefix role requirements
//!
//! Anything not under a public prefix is protected.

use crate::auth::RoleSet;
use crate::types::{Result, WardenError};

/// Prefixes reachable without a token unless configured otherwise
pub const DEFAULT_PUBLIC_PATHS: [&str; 6] = [
    "/health",
    "/docs",
    "/redoc",
    "/openapi.json",
    "/favicon.ico",
    "/auth/",
];

/// Roles required under a path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRule {
    pub prefix: String,
    pub roles: RoleSet,
}

#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    public_prefixes: Vec<String>,
    role_rules: Vec<RoleRule>,
}

impl RoutePolicy {
    pub fn new(public_prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            public_prefixes: public_prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
            role_rules: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PUBLIC_PATHS)
    }

    /// Require one of `roles` for every path under `prefix`
    pub fn require(mut self, prefix: impl Into<String>, roles: impl Into<RoleSet>) -> Self {
        self.role_rules.push(RoleRule {
            prefix: prefix.into(),
            roles: roles.into(),
        });
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = RoleRule>) -> Self {
        self.role_rules.extend(rules);
        self
    }

    pub fn public_prefixes(&self) -> &[String] {
        &self.public_prefixes
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Role set of the longest rule prefix matching `path`
    pub fn required_roles(&self, path: &str) -> Option<&RoleSet> {
        self.role_rules
            .iter()
            .filter(|rule| path.starts_with(rule.prefix.as_str()))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| &rule.roles)
    }
}

/// Parse `PREFIX=ROLE|ROLE;PREFIX=ROLE` into role rules
pub fn parse_role_rules(rules: &str) -> Result<Vec<RoleRule>> {
    rules.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (prefix, roles) = entry.split_once('=').ok_or_else(|| {
                WardenError::Config(format!("Route role rule missing '=': {}", entry))
            })?;
            let prefix = prefix.trim();
            if !prefix.starts_with('/') {
                return Err(WardenError::Config(format!(
                    "Route role prefix must start with '/': {}",
                    prefix
                )));
            }
            let roles: RoleSet = roles
                .parse()
                .map_err(|e| WardenError::Config(format!("Route role rule {}: {}", prefix, e)))?;
            if roles.is_empty() {
                return Err(WardenError::Config(format!(
                    "Route role rule {} lists no roles",
                    prefix
                )));
            }
            Ok(RoleRule {
                prefix: prefix.to_string(),
                roles,
            })
        })
        .collect()
}

/// Reject paths that could be re-interpreted by a downstream router.
/// `/auth/../admin` must never be classified as public.
pub fn check_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(WardenError::Malformed("Path must be absolute".into()));
    }
    for segment in path.split('/') {
        // Routers downstream may decode before matching, so check the decoded form too
        let decoded = urlencoding::decode(segment)
            .map_err(|_| WardenError::Malformed("Path is not valid UTF-8".into()))?;
        if is_dot_segment(segment) || decoded.split('/').any(is_dot_segment) {
            return Err(WardenError::Malformed("Path contains dot segments".into()));
        }
    }
    Ok(())
}

fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}
