//! Patient record envelope encryption for MedVault.
//!
//! The [`EnvelopeOrchestrator`] is the only way in: it authorizes the
//! requester, then drives a record through the stages in [`pipeline`]:
//!
//! - **create**: fresh record key, encrypt each sensitive field, wrap the
//!   key with the backend public key, persist.
//! - **read**: unwrap the stored key with the backend private key, decrypt,
//!   re-encrypt under a new key and wrap that key with the requester's
//!   registered public key.
//!
//! Records sealed for storage and records sealed for transport are distinct
//! types ([`SealedRecord<Storage>`] and [`SealedRecord<Transport>`]), so a
//! transport record can never reach the storage unwrap path.

pub mod config;
mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod record;
pub mod store;

pub use config::{CoreConfig, FieldSpec, SensitiveFields};
pub use error::{RecordError, RecordResult};
pub use orchestrator::EnvelopeOrchestrator;
pub use pipeline::Stage;
pub use record::{
    Destination, NewRecord, PrewrappedRecord, RecordId, RecordMetadata, SealedRecord, Storage,
    Transport,
};
pub use store::{MemoryRecordStore, RecordStore};
