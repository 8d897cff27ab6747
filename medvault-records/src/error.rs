//! Record orchestration error types.

use crate::pipeline::Stage;
use crate::record::RecordId;
use medvault_crypto::CryptoError;
use medvault_keys::KeyError;
use medvault_policy::PolicyError;
use thiserror::Error;

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors returned by the envelope orchestrator.
///
/// A `Failed` record operation never yields a partial record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    AccessDenied(#[from] PolicyError),

    #[error("record operation failed while {stage}: {source}")]
    Failed { stage: Stage, source: CryptoError },

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("invalid record: {0}")]
    InvalidInput(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("key error: {0}")]
    Keys(#[from] KeyError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RecordError {
    /// The pipeline stage a crypto failure happened in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RecordError::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RecordError::AccessDenied(_))
    }
}
