//! RSA key pair for the backend and for test requesters.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use crate::pem::{parse_private_key, parse_public_key};
use crate::wrap::{unwrap_key_with, wrap_key_with, WrappedKey};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Modulus size for generated key pairs.
pub const RSA_KEY_BITS: usize = 2048;

/// An RSA key pair together with its PEM encodings.
///
/// Immutable once built; rotation replaces the whole value.
pub struct AsymmetricKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    private_pem: Zeroizing<String>,
    public_pem: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

impl AsymmetricKeyPair {
    /// Generates a new pair with a modulus of `bits` bits.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Builds a pair from a private key, encoding it as PKCS#8 / SPKI.
    pub fn from_private_key(private_key: RsaPrivateKey) -> CryptoResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("private key encoding: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("public key encoding: {e}")))?;
        let fingerprint = public_key_fingerprint(&public_key)?;

        Ok(Self {
            private_key,
            public_key,
            private_pem,
            public_pem,
            fingerprint,
            created_at: Utc::now(),
        })
    }

    /// Loads a pair from its two PEM artifacts. The public key must be the
    /// one derived from the private key.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> CryptoResult<Self> {
        let private_key = parse_private_key(private_pem)?;
        let public_key = parse_public_key(public_pem)?;
        if RsaPublicKey::from(&private_key) != public_key {
            return Err(CryptoError::InvalidKeyMaterial(
                "public key does not belong to private key".to_string(),
            ));
        }
        let fingerprint = public_key_fingerprint(&public_key)?;

        Ok(Self {
            private_key,
            public_key,
            private_pem: Zeroizing::new(private_pem.to_string()),
            public_pem: public_pem.to_string(),
            fingerprint,
            created_at: Utc::now(),
        })
    }

    /// Overrides the creation time (e.g. with the key file's mtime).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_pem
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Short non-secret identifier, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// Wraps a record key with this pair's public key.
    pub fn wrap(&self, key: &SymmetricKey) -> CryptoResult<WrappedKey> {
        wrap_key_with(key, &self.public_key)
    }

    /// Unwraps a record key with this pair's private key.
    pub fn unwrap(&self, wrapped: &WrappedKey) -> CryptoResult<SymmetricKey> {
        unwrap_key_with(wrapped, &self.private_key)
    }
}

impl fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("fingerprint", &self.fingerprint)
            .field("bits", &self.bits())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Hex of the first 8 bytes of SHA-256 over the SPKI DER encoding.
pub fn public_key_fingerprint(public_key: &RsaPublicKey) -> CryptoResult<String> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("public key encoding: {e}")))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(&digest[..8]))
}
