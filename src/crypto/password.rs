//! Password hashing and verification
//!
//! Argon2id with fixed cost parameters, PHC string output. Verification of a
//! candidate against a nonexistent account still burns a full hash by
//! verifying against a process-wide dummy hash, so the unknown-user and
//! wrong-password paths do the same work.

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use subtle::ConstantTimeEq;

use crate::error::{PayguardError, PayguardResult};

/// Argon2id memory cost in KiB (64 MiB)
const MEMORY_COST: u32 = 65536;

/// Argon2id iteration count
const TIME_COST: u32 = 3;

/// Argon2id parallelism degree
const PARALLELISM: u32 = 4;

/// Output hash length in bytes
const OUTPUT_LEN: usize = 32;

fn hasher() -> PayguardResult<Argon2<'static>> {
    let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| PayguardError::Config(format!("Invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password, producing a PHC-format string with embedded salt
pub fn hash_password(password: &str) -> PayguardResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PayguardError::Auth(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
///
/// Cost parameters come from the hash string itself, so hashes created under
/// older parameters keep verifying.
pub fn verify_password(password: &str, stored_hash: &str) -> PayguardResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| PayguardError::Auth(format!("Stored hash is malformed: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// A valid full-cost hash of a fixed input, computed once per process
///
/// Verified against when no real credential exists, so the response time of
/// an unknown username matches a wrong password for a known one.
pub fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_password("payguard-timing-equalizer")
            .unwrap_or_else(|_| String::from("$argon2id$v=19$m=65536,t=3,p=4$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"))
    })
}

/// Constant-time byte comparison
///
/// Length mismatch returns false without leaking where the inputs diverge.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
