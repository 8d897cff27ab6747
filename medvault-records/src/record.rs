//! Record shapes: what creators submit and what the core seals.

use crate::config::SensitiveFields;
use crate::error::{RecordError, RecordResult};
use chrono::{DateTime, Utc};
use medvault_crypto::{EncryptedField, FieldValue, WrappedKey};
use medvault_policy::{Resource, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use uuid::Uuid;

/// Identifier of a patient record. Version 7, so ids sort by creation time.
pub type RecordId = Uuid;

/// Non-sensitive record data. Passed through encryption untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub patient: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_provider: Option<UserId>,
    pub created_by: UserId,
    pub visit_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMetadata {
    /// Ownership facts the access policy decides on.
    pub fn resource(&self) -> Resource {
        Resource {
            owner_id: self.patient.clone(),
            assigned_provider_id: self.assigned_provider.clone(),
        }
    }
}

/// Metadata as submitted by a creator; timestamps and author are set by
/// the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmittedMetadata {
    patient: UserId,
    #[serde(default)]
    assigned_provider: Option<UserId>,
    #[serde(default)]
    visit_date: Option<DateTime<Utc>>,
}

fn parse_metadata(body: &Value) -> RecordResult<SubmittedMetadata> {
    SubmittedMetadata::deserialize(body).map_err(|e| RecordError::InvalidInput(e.to_string()))
}

fn field_of<'a>(body: &'a Value, name: &str) -> RecordResult<&'a Value> {
    body.get(name)
        .ok_or_else(|| RecordError::InvalidInput(format!("missing field {name}")))
}

// ── NewRecord ───────────────────────────────────────────────────

/// A plaintext record submitted for creation.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub patient: UserId,
    pub assigned_provider: Option<UserId>,
    pub visit_date: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl NewRecord {
    pub fn new(patient: impl Into<UserId>) -> Self {
        Self {
            patient: patient.into(),
            assigned_provider: None,
            visit_date: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn assigned_to(mut self, provider: impl Into<UserId>) -> Self {
        self.assigned_provider = Some(provider.into());
        self
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Reads a JSON request body. Every sensitive field must be present as
    /// text (or a list of text for list fields); other keys are ignored.
    pub fn from_json(body: &Value, sensitive: &SensitiveFields) -> RecordResult<Self> {
        let meta = parse_metadata(body)?;
        let mut fields = BTreeMap::new();
        for spec in sensitive.iter() {
            let value = FieldValue::from_json(field_of(body, &spec.name)?)
                .map_err(|e| RecordError::InvalidInput(format!("{}: {e}", spec.name)))?;
            fields.insert(spec.name.clone(), value);
        }
        let record = Self {
            patient: meta.patient,
            assigned_provider: meta.assigned_provider,
            visit_date: meta.visit_date,
            fields,
        };
        record.check_fields(sensitive)?;
        Ok(record)
    }

    /// Exactly the configured sensitive fields, each of the configured kind.
    pub fn check_fields(&self, sensitive: &SensitiveFields) -> RecordResult<()> {
        for spec in sensitive.iter() {
            match self.fields.get(&spec.name) {
                None => {
                    return Err(RecordError::InvalidInput(format!(
                        "missing field {}",
                        spec.name
                    )));
                }
                Some(value) if value.kind() != spec.kind => {
                    return Err(RecordError::InvalidInput(format!(
                        "{} must be {:?}, got {:?}",
                        spec.name,
                        spec.kind,
                        value.kind()
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = self.fields.keys().find(|name| sensitive.get(name).is_none()) {
            return Err(RecordError::InvalidInput(format!(
                "{extra} is not a sensitive field"
            )));
        }
        Ok(())
    }
}

// ── PrewrappedRecord ────────────────────────────────────────────

/// A record whose fields the client already encrypted under a record key
/// it wrapped with the backend public key.
#[derive(Debug, Clone)]
pub struct PrewrappedRecord {
    pub patient: UserId,
    pub assigned_provider: Option<UserId>,
    pub visit_date: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, EncryptedField>,
}

impl PrewrappedRecord {
    /// Reads a JSON request body whose sensitive fields are `iv:ciphertext`
    /// strings.
    pub fn from_json(body: &Value, sensitive: &SensitiveFields) -> RecordResult<Self> {
        let meta = parse_metadata(body)?;
        let mut fields = BTreeMap::new();
        for spec in sensitive.iter() {
            let encoded = field_of(body, &spec.name)?.as_str().ok_or_else(|| {
                RecordError::InvalidInput(format!("{} must be an encrypted string", spec.name))
            })?;
            let field = EncryptedField::parse(encoded)
                .map_err(|e| RecordError::InvalidInput(format!("{}: {e}", spec.name)))?;
            fields.insert(spec.name.clone(), field);
        }
        Ok(Self {
            patient: meta.patient,
            assigned_provider: meta.assigned_provider,
            visit_date: meta.visit_date,
            fields,
        })
    }
}

// ── SealedRecord ────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
}

/// Whose key wraps a sealed record's key.
pub trait Destination: sealed::Sealed + Send + Sync + 'static {}

/// Key wrapped with the backend's own public key; persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storage;

/// Key wrapped with a requester's public key; returned to that requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport;

impl sealed::Sealed for Storage {}
impl sealed::Sealed for Transport {}
impl Destination for Storage {}
impl Destination for Transport {}

/// A record whose sensitive fields are encrypted and whose record key is
/// wrapped for destination `D`.
///
/// Serializes to the persisted shape: metadata and sensitive fields at the
/// top level next to `encryptedAesKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct SealedRecord<D: Destination> {
    id: RecordId,
    #[serde(flatten)]
    metadata: RecordMetadata,
    #[serde(flatten)]
    fields: BTreeMap<String, EncryptedField>,
    encrypted_aes_key: WrappedKey,
    #[serde(skip)]
    destination: PhantomData<D>,
}

impl<D: Destination> SealedRecord<D> {
    pub(crate) fn from_parts(
        id: RecordId,
        metadata: RecordMetadata,
        fields: BTreeMap<String, EncryptedField>,
        encrypted_aes_key: WrappedKey,
    ) -> Self {
        Self {
            id,
            metadata,
            fields,
            encrypted_aes_key,
            destination: PhantomData,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn fields(&self) -> &BTreeMap<String, EncryptedField> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&EncryptedField> {
        self.fields.get(name)
    }

    pub fn encrypted_aes_key(&self) -> &WrappedKey {
        &self.encrypted_aes_key
    }

    pub(crate) fn into_parts(
        self,
    ) -> (RecordId, RecordMetadata, BTreeMap<String, EncryptedField>, WrappedKey) {
        (self.id, self.metadata, self.fields, self.encrypted_aes_key)
    }
}
