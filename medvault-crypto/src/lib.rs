//! Encryption layer for MedVault.
//!
//! Provides per-record envelope encryption using:
//! - AES-256-CBC (PKCS#7 padding) for individual sensitive fields
//! - RSA-2048 with OAEP/SHA-256 for wrapping the per-record key
//! - Zeroization of symmetric key material on drop
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Record Key**: A random 256-bit key generated for every record
//!    operation. Each sensitive field is encrypted with it independently,
//!    under its own random IV.
//!
//! 2. **Key Pair**: An RSA key pair that wraps the record key. For storage
//!    the backend's own pair is used; for transport the requester's public
//!    key is used, so the backend never hands out a key wrapped for itself.

pub mod cipher;
mod error;
mod key;
pub mod keypair;
pub mod pem;
pub mod wrap;

pub use cipher::{
    decrypt_field, decrypt_value, encrypt_field, encrypt_value, EncryptedField, FieldKind,
    FieldValue, FIELD_DELIMITER, IV_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{SymmetricKey, KEY_SIZE};
pub use keypair::{public_key_fingerprint, AsymmetricKeyPair, RSA_KEY_BITS};
pub use wrap::{unwrap_key, unwrap_key_with, wrap_key, wrap_key_with, wrap_raw_key, WrappedKey};
