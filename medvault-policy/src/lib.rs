//! Access policy for MedVault.
//!
//! Decides, from a requester's role and identity and a record's ownership,
//! whether an encryption or decryption flow may start at all. Decisions are
//! pure functions over a closed [`Role`] enum; every caller goes through them.
//!
//! Also defines the audit events the envelope core emits and the
//! [`AuditSink`] seam through which they leave the core.

pub mod access;
pub mod audit;
mod error;
mod identity;

pub use access::{
    authorize, can_create, can_view_all, can_view_by_id, can_view_own, listing_scope,
    visible_to, ListingScope, Operation, OperationClass,
};
pub use audit::{
    AuditAction, AuditDecision, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use error::{PolicyError, PolicyResult};
pub use identity::{Requester, Resource, Role, UserId};
