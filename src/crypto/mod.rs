//! Cryptographic core: key management, field encryption, password hashing
//!
//! - AES-256-GCM for field-level encryption, fresh nonce per call, key
//!   version bound as associated data
//! - Argon2id for both password hashing and key-encryption-key derivation
//! - Versioned key ring with rotation; old versions retained for decryption
//! - All failures are fail-closed integrity errors, never partial output

pub mod fields;
pub mod keystore;
pub mod password;
pub mod secure_memory;

pub use fields::{decrypt_field, encrypt_field, redact, rotate_field, EncryptedField};
pub use keystore::{DataKey, KeyStore, KeyStoreCell, MasterKeySource};
pub use password::{constant_time_eq, dummy_hash, hash_password, verify_password};
pub use secure_memory::MasterSecret;
