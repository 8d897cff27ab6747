//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in field encryption and key wrapping.
///
/// `DecryptionFailed` and `UnwrapFailed` carry no detail: callers must not be
/// able to tell a wrong key apart from corrupted data.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed plaintext: {0}")]
    MalformedPlaintext(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("key format mismatch: expected {expected}, found {found}")]
    KeyFormatMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("key unwrap failed")]
    UnwrapFailed,

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
}
