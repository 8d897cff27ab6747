//! Shared fixtures for key management tests.

#![allow(dead_code)]

use medvault_crypto::{AsymmetricKeyPair, CryptoError, CryptoResult, RSA_KEY_BITS};
use medvault_keys::{KeyGenerator, KeyStoreConfig};
use std::path::Path;
use std::sync::OnceLock;

/// A generator whose entropy source is gone.
pub struct FailingGenerator;

impl KeyGenerator for FailingGenerator {
    fn generate(&self, _bits: usize) -> CryptoResult<AsymmetricKeyPair> {
        Err(CryptoError::KeyGenerationFailed(
            "entropy source unavailable".to_string(),
        ))
    }
}

pub fn fresh_pair() -> AsymmetricKeyPair {
    AsymmetricKeyPair::generate(RSA_KEY_BITS).unwrap()
}

pub fn requester_pair() -> &'static AsymmetricKeyPair {
    static PAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    PAIR.get_or_init(fresh_pair)
}

pub fn config_in(dir: &Path) -> KeyStoreConfig {
    KeyStoreConfig::with_key_dir(dir.join("keys"))
}
