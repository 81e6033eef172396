//! Login credentials, roles, and the per-credential lockout state machine
//!
//! A credential is either ACTIVE or LOCKED_OUT(until). It transitions to
//! LOCKED_OUT after a fixed number of consecutive failed attempts and back to
//! ACTIVE passively once the lockout window elapses; there is no scheduled
//! task, just a time comparison at the point of use.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lockout policy applied by the authentication gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Consecutive failures before the account locks
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    /// Duration of the lockout window in seconds
    #[serde(default = "default_lockout_seconds")]
    pub lockout_seconds: i64,
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lockout_seconds() -> i64 {
    300
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            lockout_seconds: default_lockout_seconds(),
        }
    }
}

/// A closed set of user roles
///
/// Roles map to explicit capability sets below; there is no string-based
/// dispatch anywhere in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Finance,
    Hr,
    Employee,
}

/// Things a role is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    ManageEmployees,
    ViewSensitiveFields,
    GeneratePayroll,
    LockPayroll,
    UnlockPayroll,
    ImportRecords,
    ExportReports,
    ViewOwnPayslip,
    ViewAuditLog,
    RotateKeys,
}

impl Role {
    /// The capability set for this role, checked exhaustively at definition
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                ManageUsers,
                ManageEmployees,
                ViewSensitiveFields,
                GeneratePayroll,
                LockPayroll,
                UnlockPayroll,
                ImportRecords,
                ExportReports,
                ViewOwnPayslip,
                ViewAuditLog,
                RotateKeys,
            ],
            Role::Finance => &[
                GeneratePayroll,
                LockPayroll,
                UnlockPayroll,
                ExportReports,
                ViewOwnPayslip,
                ViewAuditLog,
            ],
            Role::Hr => &[
                ManageEmployees,
                ViewSensitiveFields,
                ImportRecords,
                ViewOwnPayslip,
            ],
            Role::Employee => &[ViewOwnPayslip],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Finance => write!(f, "finance"),
            Role::Hr => write!(f, "hr"),
            Role::Employee => write!(f, "employee"),
        }
    }
}

/// A stored login credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique username
    pub username: String,
    /// Argon2id hash in PHC string format
    pub password_hash: String,
    pub role: Role,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Credential {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            role,
            active: true,
            failed_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the credential is currently locked out
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Seconds remaining in the lockout window, zero when unlocked
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(until) if until > now => (until - now).num_seconds(),
            _ => 0,
        }
    }

    /// Record a failed attempt, locking out once the policy threshold is hit
    ///
    /// An expired lockout clears the consecutive-failure counter first, so an
    /// account that served out its window starts from a clean slate.
    pub fn register_failure(&mut self, now: DateTime<Utc>, policy: &LockoutPolicy) {
        if matches!(self.locked_until, Some(until) if until <= now) {
            self.failed_attempts = 0;
            self.locked_until = None;
        }

        self.failed_attempts += 1;
        if self.failed_attempts >= policy.max_failed_attempts {
            self.locked_until = Some(now + Duration::seconds(policy.lockout_seconds));
        }
    }

    /// Record a successful login: counters reset, lockout cleared
    pub fn register_success(&mut self, now: DateTime<Utc>) {
        self.failed_attempts = 0;
        self.locked_until = None;
        self.last_login = Some(now);
    }
}
