//! PEM parsing for RSA keys.
//!
//! Public keys are accepted as SPKI (`BEGIN PUBLIC KEY`) or PKCS#1
//! (`BEGIN RSA PUBLIC KEY`); private keys as PKCS#8 (`BEGIN PRIVATE KEY`) or
//! PKCS#1 (`BEGIN RSA PRIVATE KEY`). Handing a private key where a public key
//! is expected, or the other way round, is a `KeyFormatMismatch`.

use crate::error::{CryptoError, CryptoResult};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

const SPKI_PUBLIC: &str = "PUBLIC KEY";
const PKCS1_PUBLIC: &str = "RSA PUBLIC KEY";
const PKCS8_PRIVATE: &str = "PRIVATE KEY";
const PKCS1_PRIVATE: &str = "RSA PRIVATE KEY";

/// Returns the label of the first `-----BEGIN <label>-----` line, if any.
pub fn pem_label(pem: &str) -> Option<&str> {
    let start = pem.find("-----BEGIN ")? + "-----BEGIN ".len();
    let rest = &pem[start..];
    let end = rest.find("-----")?;
    Some(&rest[..end])
}

/// True when the text carries a recognizable public-key PEM marker.
pub fn has_public_key_marker(pem: &str) -> bool {
    matches!(pem_label(pem), Some(SPKI_PUBLIC | PKCS1_PUBLIC))
}

fn is_private_label(label: &str) -> bool {
    label.ends_with(PKCS8_PRIVATE)
}

/// Parses an RSA public key from SPKI or PKCS#1 PEM.
pub fn parse_public_key(pem: &str) -> CryptoResult<RsaPublicKey> {
    match pem_label(pem) {
        Some(PKCS1_PUBLIC) => RsaPublicKey::from_pkcs1_pem(pem)
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("unparseable public key: {e}"))),
        Some(SPKI_PUBLIC) => RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("unparseable public key: {e}"))),
        Some(label) if is_private_label(label) => Err(CryptoError::KeyFormatMismatch {
            expected: "public key",
            found: label.to_string(),
        }),
        Some(label) => Err(CryptoError::InvalidKeyMaterial(format!(
            "unsupported PEM label: {label}"
        ))),
        None => Err(CryptoError::InvalidKeyMaterial(
            "public key is not PEM encoded".to_string(),
        )),
    }
}

/// Parses an RSA private key from PKCS#8 or PKCS#1 PEM.
pub fn parse_private_key(pem: &str) -> CryptoResult<RsaPrivateKey> {
    // Parse errors are kept generic so nothing about the key leaks into logs.
    match pem_label(pem) {
        Some(PKCS1_PRIVATE) => RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|_| CryptoError::InvalidKeyMaterial("unparseable private key".to_string())),
        Some(PKCS8_PRIVATE) => RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|_| CryptoError::InvalidKeyMaterial("unparseable private key".to_string())),
        Some(label @ (SPKI_PUBLIC | PKCS1_PUBLIC)) => Err(CryptoError::KeyFormatMismatch {
            expected: "private key",
            found: label.to_string(),
        }),
        Some(label) => Err(CryptoError::InvalidKeyMaterial(format!(
            "unsupported PEM label: {label}"
        ))),
        None => Err(CryptoError::InvalidKeyMaterial(
            "private key is not PEM encoded".to_string(),
        )),
    }
}
