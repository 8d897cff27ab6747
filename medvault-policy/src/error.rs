//! Policy error types.

use crate::access::OperationClass;
use crate::identity::Role;
use thiserror::Error;

/// Result type for policy decisions.
pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The role/ownership combination does not permit the operation.
    #[error("access denied: {role} may not {operation}")]
    AccessDenied {
        role: Role,
        operation: OperationClass,
    },

    #[error("unknown role: {0}")]
    UnknownRole(String),
}
