//! Versioned data-encryption key store
//!
//! The key ring holds one data key per version. The highest version is active
//! and used for all new encryption; every prior version stays available for
//! decryption only and is never destroyed, because historical ciphertext
//! depends on it.
//!
//! At rest the ring lives in a single sealed file:
//! `salt (16 bytes) || nonce (12 bytes) || AES-256-GCM ciphertext` of the JSON
//! ring, where the key-encryption key is derived from the master secret with
//! Argon2id and the file's salt. A wrong master secret fails closed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{PayguardError, PayguardResult};

use super::MasterSecret;

/// Size of the key-derivation salt in bytes
const SALT_SIZE: usize = 16;

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Argon2id memory cost in KiB (64 MiB)
const KDF_MEMORY_COST: u32 = 65536;

/// Argon2id iteration count
const KDF_TIME_COST: u32 = 3;

/// Argon2id parallelism degree
const KDF_PARALLELISM: u32 = 4;

/// A versioned symmetric data-encryption key
///
/// Immutable once created; the material is zeroed on drop.
pub struct DataKey {
    pub version: u32,
    material: Zeroizing<[u8; 32]>,
    pub created_at: DateTime<Utc>,
}

impl DataKey {
    fn generate(version: u32) -> Self {
        let mut material = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(material.as_mut());
        Self {
            version,
            material,
            created_at: Utc::now(),
        }
    }

    pub fn material(&self) -> &[u8; 32] {
        &self.material
    }
}

/// On-disk representation of one key (material base64-encoded)
#[derive(Serialize, Deserialize)]
struct StoredKey {
    version: u32,
    material: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Default)]
struct StoredRing {
    keys: Vec<StoredKey>,
}

/// Holds the active and all historical data-encryption keys
pub struct KeyStore {
    path: PathBuf,
    salt: [u8; SALT_SIZE],
    kek: Zeroizing<[u8; 32]>,
    ring: RwLock<Vec<DataKey>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material and the KEK never appear in debug output
        f.debug_struct("KeyStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Open the key store at `path`, creating version 1 on first use
    ///
    /// The master secret is consumed here: only the derived key-encryption
    /// key is retained for re-sealing on rotation.
    pub fn open(secret: MasterSecret, path: impl AsRef<Path>) -> PayguardResult<Self> {
        let path = path.as_ref().to_path_buf();

        if secret.is_empty() {
            return Err(PayguardError::Config(
                "Master secret must not be empty".into(),
            ));
        }

        if path.exists() {
            Self::load(secret, path)
        } else {
            Self::create(secret, path)
        }
    }

    fn create(secret: MasterSecret, path: PathBuf) -> PayguardResult<Self> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let kek = derive_kek(&secret, &salt)?;

        let store = Self {
            path,
            salt,
            kek,
            ring: RwLock::new(vec![DataKey::generate(1)]),
        };
        let ring = store.read_ring()?;
        store.seal(&ring)?;
        drop(ring);
        Ok(store)
    }

    fn load(secret: MasterSecret, path: PathBuf) -> PayguardResult<Self> {
        let bytes = std::fs::read(&path)
            .map_err(|e| PayguardError::Io(format!("Failed to read key store: {}", e)))?;

        if bytes.len() <= SALT_SIZE + NONCE_SIZE {
            return Err(PayguardError::Integrity(
                "Key store file is truncated".into(),
            ));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[..SALT_SIZE]);
        let nonce = Nonce::from_slice(&bytes[SALT_SIZE..SALT_SIZE + NONCE_SIZE]);
        let ciphertext = &bytes[SALT_SIZE + NONCE_SIZE..];

        let kek = derive_kek(&secret, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(kek.as_ref())
            .map_err(|e| PayguardError::Integrity(format!("Failed to create cipher: {}", e)))?;

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
            PayguardError::Integrity("Master secret does not match key store".into())
        })?;

        let stored: StoredRing = serde_json::from_slice(&plaintext)
            .map_err(|e| PayguardError::Integrity(format!("Key ring is malformed: {}", e)))?;

        if stored.keys.is_empty() {
            return Err(PayguardError::Integrity("Key ring is empty".into()));
        }

        let mut ring = Vec::with_capacity(stored.keys.len());
        for key in stored.keys {
            let raw = STANDARD.decode(&key.material).map_err(|e| {
                PayguardError::Integrity(format!("Invalid key material encoding: {}", e))
            })?;
            if raw.len() != 32 {
                return Err(PayguardError::Integrity(format!(
                    "Key material for version {} has wrong length",
                    key.version
                )));
            }
            let mut material = Zeroizing::new([0u8; 32]);
            material.copy_from_slice(&raw);
            ring.push(DataKey {
                version: key.version,
                material,
                created_at: key.created_at,
            });
        }
        ring.sort_by_key(|k| k.version);

        Ok(Self {
            path,
            salt,
            kek,
            ring: RwLock::new(ring),
        })
    }

    /// The version used for all new encryption
    pub fn active_version(&self) -> PayguardResult<u32> {
        let ring = self.read_ring()?;
        Ok(ring.last().map(|k| k.version).unwrap_or(1))
    }

    /// All key versions, oldest first
    pub fn versions(&self) -> PayguardResult<Vec<u32>> {
        let ring = self.read_ring()?;
        Ok(ring.iter().map(|k| k.version).collect())
    }

    /// Copy of the active key's material together with its version
    pub fn active_key(&self) -> PayguardResult<(u32, Zeroizing<[u8; 32]>)> {
        let ring = self.read_ring()?;
        let key = ring
            .last()
            .ok_or_else(|| PayguardError::Integrity("Key ring is empty".into()))?;
        Ok((key.version, Zeroizing::new(*key.material())))
    }

    /// Material for a specific version; unknown versions fail closed
    pub fn key_material(&self, version: u32) -> PayguardResult<Zeroizing<[u8; 32]>> {
        let ring = self.read_ring()?;
        ring.iter()
            .find(|k| k.version == version)
            .map(|k| Zeroizing::new(*k.material()))
            .ok_or_else(|| PayguardError::unknown_key_version(version))
    }

    /// Create a new data-key version and make it active
    ///
    /// All previous versions are retained for decryption. The ring is resealed
    /// to disk before the new version becomes visible; a seal failure leaves
    /// the ring unchanged.
    pub fn rotate(&self) -> PayguardResult<u32> {
        let mut ring = self
            .ring
            .write()
            .map_err(|_| PayguardError::Storage("Key ring lock poisoned".into()))?;

        let new_version = ring.last().map(|k| k.version + 1).unwrap_or(1);
        ring.push(DataKey::generate(new_version));

        if let Err(e) = self.seal(&ring) {
            ring.pop();
            return Err(e);
        }
        Ok(new_version)
    }

    fn read_ring(&self) -> PayguardResult<std::sync::RwLockReadGuard<'_, Vec<DataKey>>> {
        self.ring
            .read()
            .map_err(|_| PayguardError::Storage("Key ring lock poisoned".into()))
    }

    /// Encrypt the ring under the key-encryption key and write it atomically
    fn seal(&self, ring: &[DataKey]) -> PayguardResult<()> {
        let stored = StoredRing {
            keys: ring
                .iter()
                .map(|k| StoredKey {
                    version: k.version,
                    material: STANDARD.encode(k.material()),
                    created_at: k.created_at,
                })
                .collect(),
        };
        let plaintext = serde_json::to_vec(&stored)?;

        let cipher = Aes256Gcm::new_from_slice(self.kek.as_ref())
            .map_err(|e| PayguardError::Integrity(format!("Failed to create cipher: {}", e)))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| PayguardError::Integrity(format!("Key ring sealing failed: {}", e)))?;

        let mut bytes = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PayguardError::Io(format!("Failed to create key directory: {}", e)))?;
        }
        // Same temp+fsync+rename discipline as the JSON collections
        let temp_path = self.path.with_extension("dat.tmp");
        let mut file = std::fs::File::create(&temp_path)
            .map_err(|e| PayguardError::Io(format!("Failed to create key store file: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| PayguardError::Io(format!("Failed to write key store: {}", e)))?;
        file.sync_all()
            .map_err(|e| PayguardError::Io(format!("Failed to sync key store: {}", e)))?;
        drop(file);
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            PayguardError::Io(format!("Failed to replace key store: {}", e))
        })?;

        Ok(())
    }
}

/// Derive the key-encryption key from the master secret with Argon2id
fn derive_kek(secret: &MasterSecret, salt: &[u8]) -> PayguardResult<Zeroizing<[u8; 32]>> {
    let params = Params::new(KDF_MEMORY_COST, KDF_TIME_COST, KDF_PARALLELISM, Some(32))
        .map_err(|e| PayguardError::Config(format!("Invalid Argon2 parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut kek = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(secret.as_bytes(), salt, kek.as_mut())
        .map_err(|e| PayguardError::Config(format!("Key derivation failed: {}", e)))?;
    Ok(kek)
}

/// An ordered, named master-key provider
///
/// Providers are evaluated in the order given to [`MasterKeySource::resolve`];
/// an explicitly supplied secret always takes precedence. The environment
/// fallback exists only when the `test-secrets` cargo feature is enabled and
/// is compiled out of production builds entirely.
pub enum MasterKeySource {
    /// Secret supplied over an explicit secure channel at startup
    Explicit(MasterSecret),
    /// Test/bootstrap secret from `PAYGUARD_TEST_MASTER_KEY`
    #[cfg(feature = "test-secrets")]
    TestEnv,
}

impl MasterKeySource {
    fn provide(self) -> Option<MasterSecret> {
        match self {
            MasterKeySource::Explicit(secret) if !secret.is_empty() => Some(secret),
            MasterKeySource::Explicit(_) => None,
            #[cfg(feature = "test-secrets")]
            MasterKeySource::TestEnv => std::env::var("PAYGUARD_TEST_MASTER_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .map(MasterSecret::from),
        }
    }

    /// Evaluate providers in order and return the first secret produced
    pub fn resolve(sources: Vec<MasterKeySource>) -> PayguardResult<MasterSecret> {
        for source in sources {
            if let Some(secret) = source.provide() {
                return Ok(secret);
            }
        }
        Err(PayguardError::Config(
            "No master secret available from any configured source".into(),
        ))
    }
}

/// One-time, process-wide key store slot
///
/// An explicitly constructed cell owned by the process context and handed to
/// collaborators; not a global. First use initializes it with double-checked
/// locking: a shared-read check, then the write lock, then a re-check, so
/// concurrent first-callers always observe a single winner.
#[derive(Default)]
pub struct KeyStoreCell {
    slot: RwLock<Option<Arc<KeyStore>>>,
}

impl KeyStoreCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store, if already initialized
    pub fn get(&self) -> Option<Arc<KeyStore>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    /// Get the store, initializing it exactly once with `open`
    pub fn get_or_open(
        &self,
        open: impl FnOnce() -> PayguardResult<KeyStore>,
    ) -> PayguardResult<Arc<KeyStore>> {
        if let Some(store) = self.get() {
            return Ok(store);
        }

        let mut slot = self
            .slot
            .write()
            .map_err(|_| PayguardError::Storage("Key store slot lock poisoned".into()))?;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(open()?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }
}
