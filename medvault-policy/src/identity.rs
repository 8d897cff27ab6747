use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque user identifier as issued by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role assigned to a user.
///
/// Capabilities are declared per role in [`crate::access`]. Roles are not
/// ordered and none inherits from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Patient,
    Provider,
    Employee,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Patient,
        Role::Provider,
        Role::Employee,
        Role::Manager,
        Role::Admin,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "Patient"),
            Role::Provider => write!(f, "Provider"),
            Role::Employee => write!(f, "Employee"),
            Role::Manager => write!(f, "Manager"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    /// Parses the role claim carried by the session token. Unknown names
    /// are an error, never a default role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownRole(s.to_string()))
    }
}

/// The authenticated caller of a record operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

/// Ownership facts about a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub owner_id: UserId,
    pub assigned_provider_id: Option<UserId>,
}

impl Resource {
    pub fn owned_by(owner: impl Into<UserId>) -> Self {
        Self {
            owner_id: owner.into(),
            assigned_provider_id: None,
        }
    }

    pub fn assigned_to(mut self, provider: impl Into<UserId>) -> Self {
        self.assigned_provider_id = Some(provider.into());
        self
    }
}
