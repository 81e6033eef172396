//! Audit entry model
//!
//! Every security-relevant operation, successful or failed, produces exactly
//! one entry. Entries are immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of auditable actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    CreateUser,
    ChangePassword,
    ImportEmployees,
    ImportAttendance,
    ImportSalaryStructures,
    ImportAdjustments,
    GenerateBatch,
    LockBatch,
    UnlockBatchCritical,
    ExportSummary,
    ExportBankTransfer,
    RotateKeys,
}

impl AuditAction {
    /// Actions that reviewers should treat as exceptional events
    pub fn is_high_severity(&self) -> bool {
        matches!(
            self,
            AuditAction::UnlockBatchCritical | AuditAction::RotateKeys
        )
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditAction::Login => "login",
            AuditAction::CreateUser => "create_user",
            AuditAction::ChangePassword => "change_password",
            AuditAction::ImportEmployees => "import_employees",
            AuditAction::ImportAttendance => "import_attendance",
            AuditAction::ImportSalaryStructures => "import_salary_structures",
            AuditAction::ImportAdjustments => "import_adjustments",
            AuditAction::GenerateBatch => "generate_batch",
            AuditAction::LockBatch => "lock_batch",
            AuditAction::UnlockBatchCritical => "unlock_batch_critical",
            AuditAction::ExportSummary => "export_summary",
            AuditAction::ExportBankTransfer => "export_bank_transfer",
            AuditAction::RotateKeys => "rotate_keys",
        };
        write!(f, "{}", name)
    }
}

/// Whether the audited operation succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Username of the acting principal, or a marker like "anonymous"
    pub actor: String,
    pub action: AuditAction,
    pub outcome: Outcome,
    /// What the action operated on (a username, batch id, file name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Action-specific structured context
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Snapshot of the state a destructive action discarded
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub prior_state: serde_json::Value,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, action: AuditAction, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            outcome,
            resource: None,
            metadata: serde_json::Value::Null,
            prior_state: serde_json::Value::Null,
        }
    }

    pub fn success(actor: impl Into<String>, action: AuditAction) -> Self {
        Self::new(actor, action, Outcome::Success)
    }

    pub fn failure(actor: impl Into<String>, action: AuditAction) -> Self {
        Self::new(actor, action, Outcome::Failure)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_prior_state(mut self, prior_state: serde_json::Value) -> Self {
        self.prior_state = prior_state;
        self
    }
}
