//! Audited data-key rotation
//!
//! Rotation itself lives on the key store; this wrapper adds the capability
//! check and the high-severity audit entry that makes the new version
//! official. A rotation whose audit entry cannot be written still leaves the
//! ring usable (old versions are never destroyed), but the operation reports
//! the failure.

use crate::audit::{AuditAction, AuditEntry, AuditLedger};
use crate::auth::Identity;
use crate::crypto::KeyStore;
use crate::error::{PayguardError, PayguardResult};
use crate::models::Capability;

/// Create a new active data-key version and record who did it
pub fn rotate_data_keys(
    actor: &Identity,
    keystore: &KeyStore,
    ledger: &AuditLedger,
) -> PayguardResult<u32> {
    if !actor.role.can(Capability::RotateKeys) {
        return Err(PayguardError::Auth(format!(
            "Role '{}' may not rotate data keys",
            actor.role
        )));
    }

    let new_version = keystore.rotate()?;
    ledger.append(
        &AuditEntry::success(&actor.username, AuditAction::RotateKeys).with_metadata(
            serde_json::json!({
                "new_version": new_version,
                "versions_retained": keystore.versions()?,
            }),
        ),
    )?;
    Ok(new_version)
}
