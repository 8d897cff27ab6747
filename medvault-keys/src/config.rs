//! Key store configuration.

use crate::error::{KeyError, KeyResult};
use medvault_crypto::RSA_KEY_BITS;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Where the backend key pair lives and how often it rotates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Directory holding both PEM files.
    pub key_dir: PathBuf,

    pub private_key_file: String,

    pub public_key_file: String,

    /// RSA modulus size for generated pairs.
    pub modulus_bits: usize,

    /// Hour of day (UTC) at which the scheduler rotates the pair.
    pub rotation_hour_utc: u32,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("keys"),
            private_key_file: "backendPrivateKey.pem".to_string(),
            public_key_file: "backendPublicKey.pem".to_string(),
            modulus_bits: RSA_KEY_BITS,
            rotation_hour_utc: 3,
        }
    }
}

impl KeyStoreConfig {
    /// Default file names inside a different directory.
    pub fn with_key_dir(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
            ..Self::default()
        }
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_dir.join(&self.private_key_file)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_dir.join(&self.public_key_file)
    }

    pub fn validate(&self) -> KeyResult<()> {
        if self.modulus_bits < RSA_KEY_BITS {
            return Err(KeyError::Config(format!(
                "modulus_bits must be at least {RSA_KEY_BITS}, got {}",
                self.modulus_bits
            )));
        }
        if self.rotation_hour_utc > 23 {
            return Err(KeyError::Config(format!(
                "rotation_hour_utc must be 0-23, got {}",
                self.rotation_hour_utc
            )));
        }
        for name in [&self.private_key_file, &self.public_key_file] {
            let mut components = Path::new(name).components();
            let plain = matches!(components.next(), Some(Component::Normal(_)))
                && components.next().is_none();
            if !plain {
                return Err(KeyError::Config(format!(
                    "key file name must be a plain file name, got {name:?}"
                )));
            }
        }
        if self.private_key_file == self.public_key_file {
            return Err(KeyError::Config(
                "private and public key files must differ".to_string(),
            ));
        }
        Ok(())
    }
}
