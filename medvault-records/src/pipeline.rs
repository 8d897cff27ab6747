//! Stage functions of a record operation.
//!
//! Each function consumes one context value and returns the next, so a
//! record can only move forward:
//!
//! ```text
//! create:  OpenedRecord ──seal_for_storage──▶ SealedRecord<Storage>
//! read:    SealedRecord<Storage> ──unwrap_stored──▶ UnwrappedRecord
//!          ──decrypt_fields──▶ OpenedRecord ──reseal_for_transport──▶ SealedRecord<Transport>
//! ```
//!
//! Authorization happens before any of these run. Every function is
//! all-or-nothing: the first crypto failure aborts with the stage it
//! happened in, and no partially processed record escapes.

use crate::config::SensitiveFields;
use crate::error::{RecordError, RecordResult};
use crate::record::{Destination, RecordId, RecordMetadata, SealedRecord, Storage, Transport};
use medvault_crypto::{
    decrypt_value, encrypt_value, AsymmetricKeyPair, CryptoError, CryptoResult, EncryptedField,
    FieldValue, SymmetricKey, WrappedKey,
};
use medvault_keys::RequesterPublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Where a record operation is, or where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Authorizing,
    KeyPreparing,
    FieldProcessing,
    KeyWrapping,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Authorizing => write!(f, "authorizing"),
            Stage::KeyPreparing => write!(f, "preparing the record key"),
            Stage::FieldProcessing => write!(f, "processing fields"),
            Stage::KeyWrapping => write!(f, "wrapping the record key"),
            Stage::Done => write!(f, "done"),
        }
    }
}

fn failed(stage: Stage) -> impl FnOnce(CryptoError) -> RecordError {
    move |source| RecordError::Failed { stage, source }
}

// ── Contexts ────────────────────────────────────────────────────

/// A record with plaintext sensitive fields. Only lives inside one
/// orchestrator call.
pub struct OpenedRecord {
    id: RecordId,
    metadata: RecordMetadata,
    fields: BTreeMap<String, FieldValue>,
}

impl OpenedRecord {
    pub fn new(
        id: RecordId,
        metadata: RecordMetadata,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            id,
            metadata,
            fields,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

impl fmt::Debug for OpenedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedRecord")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A stored record whose record key has been recovered.
pub struct UnwrappedRecord {
    id: RecordId,
    metadata: RecordMetadata,
    fields: BTreeMap<String, EncryptedField>,
    key: SymmetricKey,
}

// ── Sealing ─────────────────────────────────────────────────────

fn seal<D: Destination>(
    opened: OpenedRecord,
    wrap: impl FnOnce(&SymmetricKey) -> CryptoResult<WrappedKey>,
) -> RecordResult<SealedRecord<D>> {
    let OpenedRecord {
        id,
        metadata,
        fields,
    } = opened;

    debug!(record = %id, stage = %Stage::KeyPreparing, "record stage");
    let key = SymmetricKey::generate();

    debug!(
        record = %id,
        stage = %Stage::FieldProcessing,
        fields = fields.len(),
        "record stage"
    );
    let sealed = fields
        .iter()
        .map(|(name, value)| {
            encrypt_value(value, &key)
                .map(|field| (name.clone(), field))
                .map_err(failed(Stage::FieldProcessing))
        })
        .collect::<RecordResult<BTreeMap<_, _>>>()?;

    debug!(record = %id, stage = %Stage::KeyWrapping, "record stage");
    let wrapped = wrap(&key).map_err(failed(Stage::KeyWrapping))?;

    Ok(SealedRecord::from_parts(id, metadata, sealed, wrapped))
}

/// Encrypts every field under a fresh record key and wraps that key with
/// the backend pair.
pub fn seal_for_storage(
    opened: OpenedRecord,
    pair: &AsymmetricKeyPair,
) -> RecordResult<SealedRecord<Storage>> {
    seal(opened, |key| pair.wrap(key))
}

/// Encrypts every field under a fresh record key and wraps that key for
/// the requester. The backend's own pair is never used here.
pub fn reseal_for_transport(
    opened: OpenedRecord,
    requester_key: &RequesterPublicKey,
) -> RecordResult<SealedRecord<Transport>> {
    seal(opened, |key| requester_key.wrap(key))
}

// ── Opening ─────────────────────────────────────────────────────

/// Recovers the record key of a stored record with the backend pair.
pub fn unwrap_stored(
    record: SealedRecord<Storage>,
    pair: &AsymmetricKeyPair,
) -> RecordResult<UnwrappedRecord> {
    let (id, metadata, fields, wrapped) = record.into_parts();
    debug!(
        record = %id,
        stage = %Stage::KeyPreparing,
        fingerprint = pair.fingerprint(),
        "record stage"
    );
    let key = pair.unwrap(&wrapped).map_err(failed(Stage::KeyPreparing))?;
    Ok(UnwrappedRecord {
        id,
        metadata,
        fields,
        key,
    })
}

/// Decrypts every sensitive field. A stored record missing a configured
/// field, or carrying one that is not configured, is malformed.
pub fn decrypt_fields(
    record: UnwrappedRecord,
    sensitive: &SensitiveFields,
) -> RecordResult<OpenedRecord> {
    let UnwrappedRecord {
        id,
        metadata,
        fields,
        key,
    } = record;
    debug!(
        record = %id,
        stage = %Stage::FieldProcessing,
        fields = fields.len(),
        "record stage"
    );

    if let Some(extra) = fields.keys().find(|name| sensitive.get(name).is_none()) {
        return Err(RecordError::Failed {
            stage: Stage::FieldProcessing,
            source: CryptoError::MalformedCiphertext(format!("unexpected field {extra}")),
        });
    }

    let mut opened = BTreeMap::new();
    for spec in sensitive.iter() {
        let field = fields.get(&spec.name).ok_or_else(|| RecordError::Failed {
            stage: Stage::FieldProcessing,
            source: CryptoError::MalformedCiphertext(format!("missing field {}", spec.name)),
        })?;
        let value =
            decrypt_value(field, spec.kind, &key).map_err(failed(Stage::FieldProcessing))?;
        opened.insert(spec.name.clone(), value);
    }

    Ok(OpenedRecord::new(id, metadata, opened))
}

/// Checks that every opened field can be sealed again. A field whose
/// plaintext is empty would open but could never be re-sealed for a reader.
pub fn check_resealable(opened: &OpenedRecord) -> RecordResult<()> {
    for (name, value) in &opened.fields {
        let canonical = value.to_canonical().map_err(failed(Stage::FieldProcessing))?;
        if canonical.is_empty() {
            return Err(RecordError::Failed {
                stage: Stage::FieldProcessing,
                source: CryptoError::InvalidInput(format!("{name} is empty")),
            });
        }
    }
    Ok(())
}

/// Unwraps and decrypts a stored record.
pub fn open_stored(
    record: SealedRecord<Storage>,
    pair: &AsymmetricKeyPair,
    sensitive: &SensitiveFields,
) -> RecordResult<OpenedRecord> {
    decrypt_fields(unwrap_stored(record, pair)?, sensitive)
}
