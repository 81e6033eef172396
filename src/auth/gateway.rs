//! Authentication gateway
//!
//! Single entry point for login, account creation, and password changes.
//! Login is deliberately uniform: the unknown-username, locked-out, and
//! wrong-password paths all burn a full Argon2 verification and all return
//! the same generic message, so a caller cannot tell which usernames exist.
//! The precise failure reason goes to the audit ledger only.
//!
//! Every attempt is audited after its effect; if the audit append fails, the
//! whole operation fails.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditAction, AuditEntry, AuditLedger};
use crate::crypto::{dummy_hash, hash_password, verify_password};
use crate::error::{PayguardError, PayguardResult};
use crate::models::{Capability, Credential, LockoutPolicy, Role};
use crate::storage::Storage;

/// The one message every failed login returns, regardless of cause
pub const GENERIC_LOGIN_FAILURE: &str = "Invalid username or password";

const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 8;

/// An authenticated principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

/// Result of a login attempt
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub success: bool,
    pub identity: Option<Identity>,
    pub message: String,
}

impl LoginOutcome {
    fn denied() -> Self {
        Self {
            success: false,
            identity: None,
            message: GENERIC_LOGIN_FAILURE.to_string(),
        }
    }

    fn granted(identity: Identity) -> Self {
        Self {
            success: true,
            identity: Some(identity),
            message: "Login successful".to_string(),
        }
    }
}

/// Gateway over credentials, lockout, and authentication auditing
pub struct AuthGateway {
    storage: Arc<Storage>,
    ledger: Arc<AuditLedger>,
    policy: LockoutPolicy,
}

impl AuthGateway {
    pub fn new(storage: Arc<Storage>, ledger: Arc<AuditLedger>, policy: LockoutPolicy) -> Self {
        Self {
            storage,
            ledger,
            policy,
        }
    }

    /// Attempt a login
    ///
    /// Returns `Ok` with a denied outcome for every authentication failure;
    /// `Err` is reserved for infrastructure problems (storage, audit).
    pub fn login(&self, username: &str, password: &str) -> PayguardResult<LoginOutcome> {
        let now = Utc::now();

        let credential = match self.storage.credential(username)? {
            Some(cred) => cred,
            None => {
                // No credential: verify against the dummy hash so this path
                // costs the same as a wrong password for a real account.
                let _ = verify_password(password, dummy_hash())?;
                self.audit_login_failure(username, "unknown_user", None)?;
                return Ok(LoginOutcome::denied());
            }
        };

        if credential.is_locked(now) {
            let _ = verify_password(password, dummy_hash())?;
            let remaining = credential.lockout_remaining(now);
            self.audit_login_failure(
                username,
                "locked_out",
                Some(serde_json::json!({ "remaining_seconds": remaining })),
            )?;
            return Ok(LoginOutcome::denied());
        }

        let verified = verify_password(password, &credential.password_hash)?;
        if !verified {
            let updated = self
                .storage
                .update_credential(username, |c| c.register_failure(now, &self.policy))?;
            self.audit_login_failure(
                username,
                "bad_password",
                Some(serde_json::json!({
                    "failed_attempts": updated.failed_attempts,
                    "locked": updated.is_locked(now),
                })),
            )?;
            return Ok(LoginOutcome::denied());
        }

        if !credential.active {
            // Password was correct, but the account is disabled. The attempt
            // still counts toward lockout and the caller still sees only the
            // generic message.
            let updated = self
                .storage
                .update_credential(username, |c| c.register_failure(now, &self.policy))?;
            self.audit_login_failure(
                username,
                "inactive_account",
                Some(serde_json::json!({
                    "failed_attempts": updated.failed_attempts,
                    "locked": updated.is_locked(now),
                })),
            )?;
            return Ok(LoginOutcome::denied());
        }

        self.storage
            .update_credential(username, |c| c.register_success(now))?;
        self.ledger
            .append(&AuditEntry::success(username, AuditAction::Login))?;

        Ok(LoginOutcome::granted(Identity {
            username: credential.username,
            role: credential.role,
        }))
    }

    /// Record a denied login; the detailed reason lives only in the ledger
    fn audit_login_failure(
        &self,
        username: &str,
        reason: &str,
        extra: Option<serde_json::Value>,
    ) -> PayguardResult<()> {
        let mut metadata = serde_json::json!({ "reason": reason });
        if let (Some(obj), Some(extra_obj)) =
            (metadata.as_object_mut(), extra.as_ref().and_then(|e| e.as_object()))
        {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.ledger
            .append(&AuditEntry::failure(username, AuditAction::Login).with_metadata(metadata))
    }

    /// Create a new user account
    ///
    /// Requires the acting principal to hold the user-management capability.
    pub fn create_user(
        &self,
        actor: &Identity,
        username: &str,
        password: &str,
        role: Role,
    ) -> PayguardResult<()> {
        if !actor.role.can(Capability::ManageUsers) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not manage users",
                actor.role
            )));
        }
        if username.trim().chars().count() < MIN_USERNAME_CHARS {
            return Err(PayguardError::Validation(format!(
                "Username must be at least {} characters",
                MIN_USERNAME_CHARS
            )));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(PayguardError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let hash = hash_password(password)?;
        self.storage
            .insert_credential(Credential::new(username.trim(), hash, role))?;

        let entry = AuditEntry::success(&actor.username, AuditAction::CreateUser)
            .with_resource(username.trim())
            .with_metadata(serde_json::json!({ "role": role.to_string() }));
        if let Err(e) = self.ledger.append(&entry) {
            // The account must not exist without its audit trail
            self.storage.remove_credential(username.trim())?;
            return Err(e);
        }
        Ok(())
    }

    /// Change a user's password
    ///
    /// A principal may change their own password; changing someone else's
    /// requires the user-management capability.
    pub fn change_password(
        &self,
        actor: &Identity,
        username: &str,
        new_password: &str,
    ) -> PayguardResult<()> {
        if actor.username != username && !actor.role.can(Capability::ManageUsers) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not change other users' passwords",
                actor.role
            )));
        }
        if new_password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(PayguardError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let previous = self
            .storage
            .credential(username)?
            .ok_or_else(|| PayguardError::credential_not_found(username))?;

        let hash = hash_password(new_password)?;
        self.storage
            .update_credential(username, |c| c.password_hash = hash.clone())?;

        let entry =
            AuditEntry::success(&actor.username, AuditAction::ChangePassword).with_resource(username);
        if let Err(e) = self.ledger.append(&entry) {
            self.storage.update_credential(username, |c| {
                c.password_hash = previous.password_hash.clone()
            })?;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Outcome;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        gateway: AuthGateway,
        storage: Arc<Storage>,
        ledger: Arc<AuditLedger>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("data")).unwrap());
        let ledger = Arc::new(AuditLedger::new(dir.path().join("audit.log")));
        let gateway = AuthGateway::new(
            Arc::clone(&storage),
            Arc::clone(&ledger),
            LockoutPolicy::default(),
        );
        Fixture {
            _dir: dir,
            gateway,
            storage,
            ledger,
        }
    }

    fn seed_user(fx: &Fixture, username: &str, password: &str, role: Role) {
        let hash = hash_password(password).unwrap();
        fx.storage
            .insert_credential(Credential::new(username, hash, role))
            .unwrap();
    }

    fn admin() -> Identity {
        Identity {
            username: "root".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_successful_login() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);

        let outcome = fx.gateway.login("alice", "s3cret-pass").unwrap();
        assert!(outcome.success);
        let identity = outcome.identity.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, Role::Finance);

        let cred = fx.storage.credential("alice").unwrap().unwrap();
        assert!(cred.last_login.is_some());

        let entries = fx.ledger.filter_by_action(AuditAction::Login).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Success);
    }

    #[test]
    fn test_wrong_password_is_generic_and_audited() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);

        let outcome = fx.gateway.login("alice", "wrong-pass").unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, GENERIC_LOGIN_FAILURE);

        let entries = fx.ledger.filter_by_action(AuditAction::Login).unwrap();
        assert_eq!(entries[0].outcome, Outcome::Failure);
        assert_eq!(entries[0].metadata["failed_attempts"], 1);
    }

    #[test]
    fn test_unknown_user_is_indistinguishable() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);

        let unknown = fx.gateway.login("mallory", "whatever1").unwrap();
        let wrong = fx.gateway.login("alice", "wrong-pass").unwrap();
        assert_eq!(unknown.message, wrong.message);
        assert!(unknown.identity.is_none());
    }

    #[test]
    fn test_lockout_after_consecutive_failures() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);

        for _ in 0..5 {
            let outcome = fx.gateway.login("alice", "wrong-pass").unwrap();
            assert!(!outcome.success);
        }

        // Correct password is still refused while locked, same message
        let outcome = fx.gateway.login("alice", "s3cret-pass").unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, GENERIC_LOGIN_FAILURE);

        let entries = fx.ledger.filter_by_action(AuditAction::Login).unwrap();
        let last = entries.last().unwrap();
        assert_eq!(last.metadata["reason"], "locked_out");
    }

    #[test]
    fn test_inactive_account_fails_generically() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);
        fx.storage
            .update_credential("alice", |c| c.active = false)
            .unwrap();

        let outcome = fx.gateway.login("alice", "s3cret-pass").unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, GENERIC_LOGIN_FAILURE);

        let entries = fx.ledger.filter_by_action(AuditAction::Login).unwrap();
        assert_eq!(entries[0].metadata["reason"], "inactive_account");
    }

    #[test]
    fn test_inactive_account_attempts_count_toward_lockout() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);
        fx.storage
            .update_credential("alice", |c| c.active = false)
            .unwrap();

        // Correct password against a disabled account still burns attempts
        for _ in 0..5 {
            let outcome = fx.gateway.login("alice", "s3cret-pass").unwrap();
            assert!(!outcome.success);
        }

        let cred = fx.storage.credential("alice").unwrap().unwrap();
        assert_eq!(cred.failed_attempts, 5);
        assert!(cred.is_locked(Utc::now()));

        let entries = fx.ledger.filter_by_action(AuditAction::Login).unwrap();
        assert_eq!(entries.last().unwrap().metadata["locked"], true);
    }

    #[test]
    fn test_create_user_requires_capability() {
        let fx = fixture();
        let finance = Identity {
            username: "fiona".into(),
            role: Role::Finance,
        };
        let err = fx
            .gateway
            .create_user(&finance, "newuser", "long-enough-pw", Role::Employee)
            .unwrap_err();
        assert!(matches!(err, PayguardError::Auth(_)));
    }

    #[test]
    fn test_create_user_validates_inputs() {
        let fx = fixture();
        let err = fx
            .gateway
            .create_user(&admin(), "ab", "long-enough-pw", Role::Employee)
            .unwrap_err();
        assert!(err.is_validation());

        let err = fx
            .gateway
            .create_user(&admin(), "newuser", "short", Role::Employee)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_create_user_then_login() {
        let fx = fixture();
        fx.gateway
            .create_user(&admin(), "bob", "bobs-password", Role::Hr)
            .unwrap();

        let outcome = fx.gateway.login("bob", "bobs-password").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.identity.unwrap().role, Role::Hr);

        let entries = fx.ledger.filter_by_action(AuditAction::CreateUser).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource.as_deref(), Some("bob"));
    }

    #[test]
    fn test_change_own_password() {
        let fx = fixture();
        seed_user(&fx, "alice", "old-password", Role::Employee);
        let alice = Identity {
            username: "alice".into(),
            role: Role::Employee,
        };

        fx.gateway
            .change_password(&alice, "alice", "new-password")
            .unwrap();
        assert!(fx.gateway.login("alice", "new-password").unwrap().success);
        assert!(!fx.gateway.login("alice", "old-password").unwrap().success);
    }

    #[test]
    fn test_change_other_password_requires_capability() {
        let fx = fixture();
        seed_user(&fx, "alice", "old-password", Role::Employee);
        let bob = Identity {
            username: "bob".into(),
            role: Role::Employee,
        };

        let err = fx
            .gateway
            .change_password(&bob, "alice", "new-password")
            .unwrap_err();
        assert!(matches!(err, PayguardError::Auth(_)));

        fx.gateway
            .change_password(&admin(), "alice", "new-password")
            .unwrap();
        assert!(fx.gateway.login("alice", "new-password").unwrap().success);
    }

    // Wall-clock comparison of the unknown-user and wrong-password paths.
    // Timing assertions are jitter-prone on shared runners, so this runs only
    // on demand; the structural guarantee (dummy verification on every denied
    // path) is covered by the tests above.
    #[test]
    #[ignore]
    fn test_denied_paths_take_similar_time() {
        let fx = fixture();
        seed_user(&fx, "alice", "s3cret-pass", Role::Finance);

        let start = std::time::Instant::now();
        fx.gateway.login("mallory", "whatever1").unwrap();
        let unknown_user = start.elapsed();

        let start = std::time::Instant::now();
        fx.gateway.login("alice", "wrong-pass").unwrap();
        let wrong_password = start.elapsed();

        let ratio = unknown_user.as_secs_f64() / wrong_password.as_secs_f64();
        assert!(
            (0.25..4.0).contains(&ratio),
            "paths diverged: unknown={:?} wrong={:?}",
            unknown_user,
            wrong_password
        );
    }
}
