//! Core configuration: key store settings and the sensitive field list.

use crate::error::{RecordError, RecordResult};
use medvault_crypto::FieldKind;
use medvault_keys::KeyStoreConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Record keys that are never treated as sensitive fields.
const RESERVED_NAMES: [&str; 8] = [
    "id",
    "patient",
    "assignedProvider",
    "createdBy",
    "visitDate",
    "createdAt",
    "updatedAt",
    "encryptedAesKey",
];

/// One sensitive field and the shape of its plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
        }
    }

    pub fn list(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::List,
        }
    }
}

/// The fixed list of record fields that are encrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensitiveFields(Vec<FieldSpec>);

impl Default for SensitiveFields {
    fn default() -> Self {
        Self(vec![
            FieldSpec::text("diagnosis"),
            FieldSpec::text("notes"),
            FieldSpec::list("medications"),
        ])
    }
}

impl SensitiveFields {
    pub fn new(specs: Vec<FieldSpec>) -> RecordResult<Self> {
        let fields = Self(specs);
        fields.validate()?;
        Ok(fields)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.0.iter().find(|spec| spec.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.get(name).map(|spec| spec.kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> RecordResult<()> {
        if self.0.is_empty() {
            return Err(RecordError::Config(
                "at least one sensitive field is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &self.0 {
            if spec.name.is_empty() {
                return Err(RecordError::Config("empty field name".to_string()));
            }
            if RESERVED_NAMES.contains(&spec.name.as_str()) {
                return Err(RecordError::Config(format!(
                    "{} is record metadata and cannot be encrypted",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(RecordError::Config(format!(
                    "duplicate sensitive field {}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// Everything the envelope core needs at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub keys: KeyStoreConfig,
    pub fields: SensitiveFields,
}

impl CoreConfig {
    /// Loads and validates a JSON config file. Missing sections take their
    /// defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> RecordResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RecordError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| RecordError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecordResult<()> {
        self.keys.validate()?;
        self.fields.validate()
    }
}
