//! Role/ownership decisions for record operations.
//!
//! Every function here is total and side-effect free. Each decision is a
//! single exhaustive `match` over [`Role`] with no wildcard arm.

use crate::error::{PolicyError, PolicyResult};
use crate::identity::{Requester, Resource, Role, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of record operation, used in denials and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationClass {
    Create,
    ViewAll,
    ViewOwn,
    ViewById,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Create => write!(f, "create records"),
            OperationClass::ViewAll => write!(f, "view all records"),
            OperationClass::ViewOwn => write!(f, "view own records"),
            OperationClass::ViewById => write!(f, "view this record"),
        }
    }
}

/// A concrete operation to authorize, with the ownership facts it needs.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Create,
    ViewAll,
    ViewOwn { owner: &'a UserId },
    ViewById { resource: &'a Resource },
}

impl Operation<'_> {
    pub fn class(&self) -> OperationClass {
        match self {
            Operation::Create => OperationClass::Create,
            Operation::ViewAll => OperationClass::ViewAll,
            Operation::ViewOwn { .. } => OperationClass::ViewOwn,
            Operation::ViewById { .. } => OperationClass::ViewById,
        }
    }
}

pub fn can_create(role: Role) -> bool {
    match role {
        Role::Provider | Role::Manager => true,
        Role::Patient | Role::Employee | Role::Admin => false,
    }
}

/// Providers see a filtered subset (see [`listing_scope`]), not "all".
pub fn can_view_all(role: Role) -> bool {
    match role {
        Role::Manager => true,
        Role::Patient | Role::Provider | Role::Employee | Role::Admin => false,
    }
}

pub fn can_view_own(role: Role, requester_id: &UserId, owner_id: &UserId) -> bool {
    match role {
        Role::Patient => requester_id == owner_id,
        Role::Provider | Role::Employee | Role::Manager | Role::Admin => false,
    }
}

/// Administrative roles get no clinical read access through this path.
pub fn can_view_by_id(role: Role, requester_id: &UserId, resource: &Resource) -> bool {
    match role {
        Role::Patient => *requester_id == resource.owner_id,
        Role::Manager => true,
        Role::Provider => resource.assigned_provider_id.as_ref() == Some(requester_id),
        Role::Employee | Role::Admin => false,
    }
}

/// Checks one operation, returning `AccessDenied` when the policy refuses.
pub fn authorize(requester: &Requester, operation: Operation<'_>) -> PolicyResult<()> {
    let allowed = match operation {
        Operation::Create => can_create(requester.role),
        Operation::ViewAll => can_view_all(requester.role),
        Operation::ViewOwn { owner } => can_view_own(requester.role, &requester.id, owner),
        Operation::ViewById { resource } => {
            can_view_by_id(requester.role, &requester.id, resource)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(PolicyError::AccessDenied {
            role: requester.role,
            operation: operation.class(),
        })
    }
}

/// Which records a listing request may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// Every record.
    All,
    /// Only records assigned to this provider.
    AssignedTo(UserId),
}

impl ListingScope {
    /// Whether a record falls inside the scope. Every match is also a
    /// `can_view_by_id` allow for the same requester.
    pub fn includes(&self, resource: &Resource) -> bool {
        match self {
            ListingScope::All => true,
            ListingScope::AssignedTo(provider) => {
                resource.assigned_provider_id.as_ref() == Some(provider)
            }
        }
    }
}

/// Whether a record may appear in the requester's listing.
///
/// Denied roles see nothing; everyone else sees what their
/// [`ListingScope`] includes.
pub fn visible_to(requester: &Requester, resource: &Resource) -> bool {
    listing_scope(requester).is_ok_and(|scope| scope.includes(resource))
}

/// Resolves the listing scope for a requester.
///
/// Managers list everything and providers list their assigned subset.
/// Patients go through [`Operation::ViewOwn`] instead; every other role is
/// denied.
pub fn listing_scope(requester: &Requester) -> PolicyResult<ListingScope> {
    if can_view_all(requester.role) {
        return Ok(ListingScope::All);
    }
    match requester.role {
        Role::Provider => Ok(ListingScope::AssignedTo(requester.id.clone())),
        Role::Patient | Role::Employee | Role::Manager | Role::Admin => {
            Err(PolicyError::AccessDenied {
                role: requester.role,
                operation: OperationClass::ViewAll,
            })
        }
    }
}
