//! Field-level encryption for sensitive values
//!
//! Each sensitive value is encrypted independently with AES-256-GCM under the
//! key store's active data key. The envelope records which key version was
//! used and binds that version into the authenticated data, so a ciphertext
//! cannot be silently re-attributed to another key. Decryption fails closed:
//! any tag mismatch, unknown version, or malformed encoding is an integrity
//! error, never partial plaintext.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{PayguardError, PayguardResult};

use super::KeyStore;

const NONCE_SIZE: usize = 12;

/// An encrypted field value, safe to persist and serialize
///
/// The GCM authentication tag is appended to the ciphertext; `key_version` is
/// additionally bound as associated data, so tampering with either the bytes
/// or the version label fails authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub key_version: u32,
    pub nonce: String,
    pub ciphertext: String,
}

/// Associated data binding a ciphertext to its key version
fn version_aad(version: u32) -> [u8; 4] {
    version.to_be_bytes()
}

/// Encrypt a plaintext value under the active data key
///
/// Every call draws a fresh random nonce; encrypting the same value twice
/// yields different ciphertexts.
pub fn encrypt_field(keystore: &KeyStore, plaintext: &str) -> PayguardResult<EncryptedField> {
    let (version, material) = keystore.active_key()?;

    let cipher = Aes256Gcm::new_from_slice(material.as_ref())
        .map_err(|e| PayguardError::Integrity(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = version_aad(version);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| PayguardError::Integrity(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedField {
        key_version: version,
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Decrypt a field using the key version recorded in its envelope
pub fn decrypt_field(keystore: &KeyStore, field: &EncryptedField) -> PayguardResult<String> {
    let material = keystore.key_material(field.key_version)?;

    let cipher = Aes256Gcm::new_from_slice(material.as_ref())
        .map_err(|e| PayguardError::Integrity(format!("Failed to create cipher: {}", e)))?;

    let nonce_bytes = STANDARD
        .decode(&field.nonce)
        .map_err(|e| PayguardError::Integrity(format!("Invalid nonce encoding: {}", e)))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(PayguardError::Integrity("Invalid nonce length".into()));
    }
    let ciphertext = STANDARD
        .decode(&field.ciphertext)
        .map_err(|e| PayguardError::Integrity(format!("Invalid ciphertext encoding: {}", e)))?;

    let aad = version_aad(field.key_version);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: ciphertext.as_slice(),
                aad: &aad,
            },
        )
        .map_err(|_| {
            PayguardError::Integrity("Decryption failed: authentication tag mismatch".into())
        })?;

    String::from_utf8(plaintext)
        .map_err(|_| PayguardError::Integrity("Decrypted value is not valid UTF-8".into()))
}

/// Re-encrypt a field under the current active key
///
/// Used opportunistically after rotation; old envelopes stay readable either
/// way because historical key versions are retained.
pub fn rotate_field(keystore: &KeyStore, field: &EncryptedField) -> PayguardResult<EncryptedField> {
    let plaintext = decrypt_field(keystore, field)?;
    encrypt_field(keystore, &plaintext)
}

/// Mask a sensitive value for display, keeping only the trailing characters
pub fn redact(value: &str, show_last: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= show_last {
        return "*".repeat(chars.len());
    }
    let masked = "*".repeat(chars.len() - show_last);
    let tail: String = chars[chars.len() - show_last..].iter().collect();
    format!("{}{}", masked, tail)
}
