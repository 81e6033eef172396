//! Payroll batch and pay line models
//!
//! A batch is the computed pay for all included employees in one period. Its
//! lifecycle is a two-state machine: DRAFT (mutable) and LOCKED (immutable).
//! Transitions are enforced here and again at the storage boundary; unlocking
//! additionally requires an explicit confirmation and reason at the engine
//! level and is audited under a high-severity action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PayguardError, PayguardResult};
use crate::models::{Money, PayPeriod};

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Mutable; lines may be regenerated or corrected
    Draft,
    /// Immutable; line mutation is rejected at the storage boundary
    Locked,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Draft => write!(f, "draft"),
            BatchStatus::Locked => write!(f, "locked"),
        }
    }
}

/// One employee's computed pay for a period
///
/// Every monetary field is quantized Money (integer cents); each was rounded
/// at the step that produced it, so line and batch totals are exact sums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayLine {
    pub employee_no: String,
    pub employee_name: String,
    pub base_salary: Money,
    pub overtime_pay: Money,
    pub allowances_total: Money,
    pub adjustments_add: Money,
    pub gross: Money,
    pub absence_deduction: Money,
    pub fixed_deductions: Money,
    pub adjustments_deduct: Money,
    pub tax: Money,
    pub total_deductions: Money,
    pub net: Money,
}

/// A payroll batch for one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollBatch {
    pub id: Uuid,
    pub period: PayPeriod,
    pub status: BatchStatus,
    pub lines: Vec<PayLine>,
    pub generated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    pub gross_total: Money,
    pub deduction_total: Money,
    pub net_total: Money,
    pub created_at: DateTime<Utc>,
}

impl PayrollBatch {
    /// Create a DRAFT batch; totals are the sums of the per-line quantized
    /// values, never recomputed from unquantized inputs.
    pub fn new(period: PayPeriod, lines: Vec<PayLine>, generated_by: impl Into<String>) -> Self {
        let gross_total = lines.iter().map(|l| l.gross).sum();
        let deduction_total = lines.iter().map(|l| l.total_deductions).sum();
        let net_total = lines.iter().map(|l| l.net).sum();

        Self {
            id: Uuid::new_v4(),
            period,
            status: BatchStatus::Draft,
            lines,
            generated_by: generated_by.into(),
            locked_by: None,
            locked_at: None,
            gross_total,
            deduction_total,
            net_total,
            created_at: Utc::now(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == BatchStatus::Locked
    }

    /// Transition DRAFT -> LOCKED
    pub fn lock(&mut self, actor: &str, now: DateTime<Utc>) -> PayguardResult<()> {
        if self.status != BatchStatus::Draft {
            return Err(PayguardError::State(format!(
                "Batch {} cannot be locked from status '{}'",
                self.id, self.status
            )));
        }
        self.status = BatchStatus::Locked;
        self.locked_by = Some(actor.to_string());
        self.locked_at = Some(now);
        Ok(())
    }

    /// Transition LOCKED -> DRAFT
    pub fn unlock(&mut self) -> PayguardResult<()> {
        if self.status != BatchStatus::Locked {
            return Err(PayguardError::State(format!(
                "Batch {} cannot be unlocked from status '{}'",
                self.id, self.status
            )));
        }
        self.status = BatchStatus::Draft;
        self.locked_by = None;
        self.locked_at = None;
        Ok(())
    }

    /// Snapshot of the state an unlock is about to discard, for the audit trail
    pub fn lock_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "period": self.period.to_string(),
            "employees": self.lines.len(),
            "gross_total": self.gross_total,
            "deduction_total": self.deduction_total,
            "net_total": self.net_total,
            "locked_by": self.locked_by,
            "locked_at": self.locked_at,
        })
    }
}
