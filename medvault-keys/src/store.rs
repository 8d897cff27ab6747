//! The backend key pair and its on-disk artifacts.
//!
//! Exactly one pair is current. Readers take an `Arc` snapshot with
//! [`KeyStore::current`] and keep using it for the whole record operation;
//! [`KeyStore::rotate`] is the only writer and swaps the snapshot after the
//! new pair is safely on disk.

use crate::config::KeyStoreConfig;
use crate::error::{KeyError, KeyResult};
use chrono::{DateTime, Utc};
use medvault_crypto::{AsymmetricKeyPair, CryptoError, CryptoResult};
use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Source of new key pairs.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, bits: usize) -> CryptoResult<AsymmetricKeyPair>;
}

/// Generates RSA pairs from OS entropy.
pub struct RsaKeyGenerator;

impl KeyGenerator for RsaKeyGenerator {
    fn generate(&self, bits: usize) -> CryptoResult<AsymmetricKeyPair> {
        AsymmetricKeyPair::generate(bits)
    }
}

fn generation_failed(err: CryptoError) -> KeyError {
    match err {
        CryptoError::KeyGenerationFailed(reason) => KeyError::KeyGenerationFailed(reason),
        other => KeyError::KeyGenerationFailed(other.to_string()),
    }
}

// ── KeyFiles ────────────────────────────────────────────────────

struct KeyFiles {
    dir: PathBuf,
    private_path: PathBuf,
    public_path: PathBuf,
}

impl KeyFiles {
    fn from_config(config: &KeyStoreConfig) -> Self {
        Self {
            dir: config.key_dir.clone(),
            private_path: config.private_key_path(),
            public_path: config.public_key_path(),
        }
    }

    /// Loads the pair if both files exist. One file without the other is an
    /// error rather than a reason to silently generate a new pair.
    fn load(&self) -> KeyResult<Option<AsymmetricKeyPair>> {
        match (self.private_path.exists(), self.public_path.exists()) {
            (false, false) => Ok(None),
            (true, false) => Err(KeyError::IncompleteKeyPair(self.public_path.clone())),
            (false, true) => Err(KeyError::IncompleteKeyPair(self.private_path.clone())),
            (true, true) => {
                let private_pem = fs::read_to_string(&self.private_path)?;
                let public_pem = fs::read_to_string(&self.public_path)?;
                let mut pair = AsymmetricKeyPair::from_pem(&private_pem, &public_pem)?;
                if let Some(modified) = modified_at(&self.private_path) {
                    pair = pair.with_created_at(modified);
                }
                Ok(Some(pair))
            }
        }
    }

    /// Writes both PEMs to temp files, then renames them into place.
    ///
    /// If the second rename fails the first file already holds the new
    /// private key, so the previous private key is written back.
    fn persist(
        &self,
        pair: &AsymmetricKeyPair,
        previous: Option<&AsymmetricKeyPair>,
    ) -> KeyResult<()> {
        fs::create_dir_all(&self.dir)?;

        let private_tmp = temp_path(&self.private_path);
        let public_tmp = temp_path(&self.public_path);

        let staged = write_key_file(&private_tmp, pair.private_key_pem())
            .and_then(|()| write_key_file(&public_tmp, pair.public_key_pem()));
        if let Err(e) = staged {
            let _ = fs::remove_file(&private_tmp);
            let _ = fs::remove_file(&public_tmp);
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&private_tmp, &self.private_path) {
            let _ = fs::remove_file(&private_tmp);
            let _ = fs::remove_file(&public_tmp);
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&public_tmp, &self.public_path) {
            let _ = fs::remove_file(&public_tmp);
            if let Some(previous) = previous {
                let restored = replace_key_file(&self.private_path, previous.private_key_pem());
                if let Err(restore) = restored {
                    error!(
                        path = %self.private_path.display(),
                        "failed to restore previous private key: {restore}"
                    );
                }
            }
            return Err(e.into());
        }

        debug!(dir = %self.dir.display(), "persisted key pair");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes a key file readable by the owner only.
fn write_key_file(path: &Path, contents: &str) -> io::Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

/// Swaps a single key file through its temp file.
fn replace_key_file(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = temp_path(path);
    let replaced = write_key_file(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    if replaced.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    replaced
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

// ── KeyStore ────────────────────────────────────────────────────

/// Holds the backend's current key pair.
pub struct KeyStore {
    current: RwLock<Arc<AsymmetricKeyPair>>,
    files: Option<KeyFiles>,
    generator: Box<dyn KeyGenerator>,
    modulus_bits: usize,
    rotation: Mutex<()>,
}

impl KeyStore {
    /// Loads the pair from the configured directory, generating and
    /// persisting one if none exists yet.
    pub fn open(config: &KeyStoreConfig) -> KeyResult<Self> {
        Self::open_with_generator(config, Box::new(RsaKeyGenerator))
    }

    pub fn open_with_generator(
        config: &KeyStoreConfig,
        generator: Box<dyn KeyGenerator>,
    ) -> KeyResult<Self> {
        config.validate()?;
        let files = KeyFiles::from_config(config);

        let pair = match files.load()? {
            Some(pair) => {
                info!(
                    fingerprint = pair.fingerprint(),
                    dir = %files.dir.display(),
                    "loaded backend key pair"
                );
                pair
            }
            None => {
                let pair = generator
                    .generate(config.modulus_bits)
                    .map_err(generation_failed)?;
                files.persist(&pair, None)?;
                info!(
                    fingerprint = pair.fingerprint(),
                    dir = %files.dir.display(),
                    "generated backend key pair at first boot"
                );
                pair
            }
        };

        Ok(Self {
            current: RwLock::new(Arc::new(pair)),
            files: Some(files),
            generator,
            modulus_bits: config.modulus_bits,
            rotation: Mutex::new(()),
        })
    }

    /// A store with no disk backing. Rotation only swaps the in-memory pair.
    pub fn in_memory(pair: AsymmetricKeyPair) -> Self {
        Self::with_generator(pair, Box::new(RsaKeyGenerator))
    }

    pub fn with_generator(pair: AsymmetricKeyPair, generator: Box<dyn KeyGenerator>) -> Self {
        let modulus_bits = pair.bits();
        Self {
            current: RwLock::new(Arc::new(pair)),
            files: None,
            generator,
            modulus_bits,
            rotation: Mutex::new(()),
        }
    }

    /// Snapshot of the current pair.
    pub fn current(&self) -> Arc<AsymmetricKeyPair> {
        // The guarded value is a single Arc, always whole, so a poisoned
        // lock still holds a usable snapshot.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn public_key_pem(&self) -> String {
        self.current().public_key_pem().to_string()
    }

    /// Directory backing this store, if any.
    pub fn key_dir(&self) -> Option<&Path> {
        self.files.as_ref().map(|f| f.dir.as_path())
    }

    /// Replaces the current pair with a freshly generated one.
    ///
    /// The new pair becomes current only after it is persisted. On any
    /// failure the previous pair stays current.
    pub fn rotate(&self) -> KeyResult<Arc<AsymmetricKeyPair>> {
        let _rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.current();

        let pair = self
            .generator
            .generate(self.modulus_bits)
            .map_err(generation_failed)?;

        if let Some(files) = &self.files {
            files.persist(&pair, Some(&previous))?;
        }

        let pair = Arc::new(pair);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&pair);
        }

        info!(
            previous = previous.fingerprint(),
            current = pair.fingerprint(),
            "rotated backend key pair"
        );
        Ok(pair)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("current", &self.current())
            .field("key_dir", &self.key_dir())
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}
