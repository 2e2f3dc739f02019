//! Subject roles and role sets for route authorization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::WardenError;

/// Role assigned to a subject when its token is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Physician or nurse acting on patient records
    Clinician,
    /// Hospital department account (reception, lab, billing)
    HospitalService,
    Patient,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::Clinician,
        Role::HospitalService,
        Role::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Clinician => "CLINICIAN",
            Role::HospitalService => "HOSPITAL_SERVICE",
            Role::Patient => "PATIENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "CLINICIAN" => Ok(Role::Clinician),
            "HOSPITAL_SERVICE" => Ok(Role::HospitalService),
            "PATIENT" => Ok(Role::Patient),
            other => Err(WardenError::Malformed(format!("Unknown role: {}", other))),
        }
    }
}

/// Set of roles allowed on a route. Membership is exact; there is no
/// hierarchy between roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut roles: Vec<Role> = roles.into_iter().collect();
        roles.sort();
        roles.dedup();
        Self { roles }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        RoleSet::new(roles)
    }
}

impl FromStr for RoleSet {
    type Err = WardenError;

    /// Parse a `|`-separated list such as `ADMIN|CLINICIAN`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split('|')
            .filter(|part| !part.trim().is_empty())
            .map(Role::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RoleSet::new(roles))
    }
}
