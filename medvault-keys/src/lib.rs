//! Backend key management for MedVault.
//!
//! - [`KeyStore`] owns the backend's single current RSA key pair, loads it
//!   from disk (or creates it at first boot) and replaces it on rotation.
//! - [`KeyExchange`] publishes the backend public key and validates the
//!   public keys requesters register for transport wrapping.
//! - [`RotationScheduler`] calls [`KeyStore::rotate`] once a day.
//!
//! Rotation keeps no prior pairs. Anything wrapped for storage before a
//! rotation can no longer be unwrapped afterwards.

mod config;
mod error;
pub mod exchange;
pub mod rotation;
pub mod store;

pub use config::KeyStoreConfig;
pub use error::{KeyError, KeyResult};
pub use exchange::{
    KeyExchange, PublicKeyResponse, RegisterKeyRequest, RegisterKeyResponse, RequesterPublicKey,
    PUBLIC_KEY_HEADER, WRAPPED_KEY_HEADER,
};
pub use rotation::{next_rotation_after, RotationScheduler};
pub use store::{KeyGenerator, KeyStore, RsaKeyGenerator};
