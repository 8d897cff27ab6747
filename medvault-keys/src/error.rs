//! Key management error types.

use medvault_crypto::CryptoError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for key management operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors raised by the key store and key exchange.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("invalid public key format")]
    InvalidPublicKeyFormat,

    #[error("incomplete key pair on disk: {} is missing", .0.display())]
    IncompleteKeyPair(PathBuf),

    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
