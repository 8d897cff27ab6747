//! AES-256-CBC field encryption.
//!
//! Each sensitive field is encrypted on its own under a fresh 16-byte IV and
//! encoded as `hex(iv):hex(ciphertext)`. Hex output never contains the `:`
//! delimiter, so the encoded form always splits unambiguously.
//!
//! An [`EncryptedField`] can only be obtained from [`encrypt_field`] or by
//! parsing a stored value; there is no constructor that accepts a caller
//! chosen IV, which keeps IV reuse out of reach of callers.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

const BLOCK_SIZE: usize = 16;

/// Separator between the encoded IV and ciphertext.
pub const FIELD_DELIMITER: char = ':';

/// An encrypted field value: IV plus AES-256-CBC ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedField {
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

impl EncryptedField {
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Encodes as `hex(iv):hex(ciphertext)`.
    pub fn encode(&self) -> String {
        format!(
            "{}{FIELD_DELIMITER}{}",
            hex::encode(self.iv),
            hex::encode(&self.ciphertext)
        )
    }

    /// Parses the `hex(iv):hex(ciphertext)` form.
    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let (iv_hex, ct_hex) = encoded.split_once(FIELD_DELIMITER).ok_or_else(|| {
            CryptoError::MalformedCiphertext("missing IV delimiter".to_string())
        })?;

        let iv_bytes = hex::decode(iv_hex)
            .map_err(|_| CryptoError::MalformedCiphertext("IV is not valid hex".to_string()))?;
        let iv: [u8; IV_SIZE] = iv_bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::MalformedCiphertext(format!(
                "IV must be {IV_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;

        let ciphertext = hex::decode(ct_hex).map_err(|_| {
            CryptoError::MalformedCiphertext("ciphertext is not valid hex".to_string())
        })?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::MalformedCiphertext(format!(
                "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
                ciphertext.len()
            )));
        }

        Ok(Self { iv, ciphertext })
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("iv", &hex::encode(self.iv))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl FromStr for EncryptedField {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EncryptedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for EncryptedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::parse(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Encrypts a non-empty text value under `key` with a fresh random IV.
pub fn encrypt_field(plaintext: &str, key: &SymmetricKey) -> CryptoResult<EncryptedField> {
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidInput("plaintext is empty".to_string()));
    }

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(EncryptedField { iv, ciphertext })
}

/// Decrypts a field. Bad padding and non-UTF-8 output both report
/// `DecryptionFailed`.
pub fn decrypt_field(field: &EncryptedField, key: &SymmetricKey) -> CryptoResult<String> {
    let plaintext = Aes256CbcDec::new_from_slices(key.as_bytes(), &field.iv)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&field.ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

// ── Typed field values ──────────────────────────────────────────

/// Shape of a sensitive field before encryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    List,
}

/// A plaintext sensitive field value.
///
/// Lists are encrypted as their canonical JSON form (`["a","b"]`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::List(_) => FieldKind::List,
        }
    }

    /// Accepts a JSON string or an array of JSON strings. Anything else is
    /// not a text value and is rejected as `InvalidInput`.
    pub fn from_json(value: &serde_json::Value) -> CryptoResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        CryptoError::InvalidInput("list entries must be strings".to_string())
                    })
                })
                .collect::<CryptoResult<Vec<_>>>()
                .map(FieldValue::List),
            other => Err(CryptoError::InvalidInput(format!(
                "expected text or list of text, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// Canonical string form that gets encrypted.
    pub fn to_canonical(&self) -> CryptoResult<String> {
        match self {
            FieldValue::Text(s) => Ok(s.clone()),
            FieldValue::List(items) => serde_json::to_string(items)
                .map_err(|e| CryptoError::MalformedPlaintext(e.to_string())),
        }
    }

    /// Inverse of [`to_canonical`](Self::to_canonical).
    pub fn from_canonical(canonical: String, kind: FieldKind) -> CryptoResult<Self> {
        match kind {
            FieldKind::Text => Ok(FieldValue::Text(canonical)),
            // serde_json errors quote the offending input, which is plaintext.
            FieldKind::List => serde_json::from_str::<Vec<String>>(&canonical)
                .map(FieldValue::List)
                .map_err(|_| {
                    CryptoError::MalformedPlaintext(
                        "list field is not a JSON array of strings".to_string(),
                    )
                }),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "Text(<{} bytes>)", s.len()),
            FieldValue::List(items) => write!(f, "List(<{} items>)", items.len()),
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Encrypts a typed value via its canonical string form.
pub fn encrypt_value(value: &FieldValue, key: &SymmetricKey) -> CryptoResult<EncryptedField> {
    let canonical = value.to_canonical()?;
    encrypt_field(&canonical, key)
}

/// Decrypts a field and parses it back into a value of `kind`.
pub fn decrypt_value(
    field: &EncryptedField,
    kind: FieldKind,
    key: &SymmetricKey,
) -> CryptoResult<FieldValue> {
    let canonical = decrypt_field(field, key)?;
    FieldValue::from_canonical(canonical, kind)
}
