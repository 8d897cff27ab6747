//! Shared fixtures for crypto integration tests.
//!
//! RSA generation dominates test time, so each binary builds its pairs once.

use medvault_crypto::{AsymmetricKeyPair, RSA_KEY_BITS};
use std::sync::OnceLock;

pub fn backend_pair() -> &'static AsymmetricKeyPair {
    static PAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| AsymmetricKeyPair::generate(RSA_KEY_BITS).unwrap())
}

pub fn requester_pair() -> &'static AsymmetricKeyPair {
    static PAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| AsymmetricKeyPair::generate(RSA_KEY_BITS).unwrap())
}
