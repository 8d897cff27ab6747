//! RSA-OAEP wrapping of record keys.
//!
//! A single padding scheme (OAEP with SHA-256) is used for both directions;
//! it is built in one place so wrap and unwrap cannot drift apart.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use crate::pem::{parse_private_key, parse_public_key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

fn padding() -> Oaep {
    Oaep::new::<Sha256>()
}

/// A record key encrypted under an RSA public key.
///
/// Transported and persisted as standard base64.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn from_bytes(blob: Vec<u8>) -> Self {
        Self(blob)
    }

    /// Decodes the base64 transport form. A blob that is not valid base64
    /// is treated like any other corrupted blob.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|_| CryptoError::UnwrapFailed)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey(<{} bytes>)", self.0.len())
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map(WrappedKey)
            .map_err(|_| serde::de::Error::custom("wrapped key is not valid base64"))
    }
}

/// Wraps a record key with a PEM-encoded RSA public key.
pub fn wrap_key(key: &SymmetricKey, public_pem: &str) -> CryptoResult<WrappedKey> {
    let public_key = parse_public_key(public_pem)?;
    wrap_key_with(key, &public_key)
}

/// Wraps raw key bytes, which must be exactly 32 bytes.
pub fn wrap_raw_key(key: &[u8], public_pem: &str) -> CryptoResult<WrappedKey> {
    let key = SymmetricKey::from_slice(key)?;
    wrap_key(&key, public_pem)
}

/// Wraps a record key with an already parsed public key.
pub fn wrap_key_with(key: &SymmetricKey, public_key: &RsaPublicKey) -> CryptoResult<WrappedKey> {
    public_key
        .encrypt(&mut OsRng, padding(), key.as_bytes())
        .map(WrappedKey)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("public key cannot wrap: {e}")))
}

/// Unwraps a record key with a PEM-encoded RSA private key.
pub fn unwrap_key(wrapped: &WrappedKey, private_pem: &str) -> CryptoResult<SymmetricKey> {
    let private_key = parse_private_key(private_pem)?;
    unwrap_key_with(wrapped, &private_key)
}

/// Unwraps a record key with an already parsed private key.
///
/// Every failure collapses to `UnwrapFailed`, including a decrypted payload
/// of the wrong length.
pub fn unwrap_key_with(
    wrapped: &WrappedKey,
    private_key: &RsaPrivateKey,
) -> CryptoResult<SymmetricKey> {
    let bytes = private_key
        .decrypt_blinded(&mut OsRng, padding(), &wrapped.0)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::UnwrapFailed)?;

    SymmetricKey::from_slice(&bytes).map_err(|_| CryptoError::UnwrapFailed)
}
