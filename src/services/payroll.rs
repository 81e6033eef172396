//! Payroll batch generation and lifecycle
//!
//! Generation computes one pay line per active employee with attendance on
//! record; the arithmetic quantizes to the cent at every step so batch totals
//! are exact sums of line values. Lifecycle transitions serialize per period,
//! are guarded again at the storage boundary, and are only complete once
//! their audit entry is written; a failed audit append reverts the effect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditLedger};
use crate::auth::Identity;
use crate::error::{PayguardError, PayguardResult};
use crate::models::{
    Attendance, Capability, Employee, Money, PayLine, PayPeriod, PayrollBatch, SalaryStructure,
};
use crate::storage::Storage;

/// Minimum trimmed length of an unlock justification
pub const DEFAULT_MIN_UNLOCK_REASON_CHARS: usize = 10;

/// A generated batch plus per-employee exclusion warnings
#[derive(Debug)]
pub struct GenerateOutcome {
    pub batch: PayrollBatch,
    pub warnings: Vec<String>,
}

/// Drives batch generation and the DRAFT/LOCKED lifecycle
pub struct PayrollEngine {
    storage: Arc<Storage>,
    ledger: Arc<AuditLedger>,
    // One guard per period so concurrent transitions on the same period
    // serialize while different periods proceed in parallel
    period_locks: Mutex<HashMap<PayPeriod, Arc<Mutex<()>>>>,
    min_unlock_reason_chars: usize,
}

impl PayrollEngine {
    pub fn new(storage: Arc<Storage>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            storage,
            ledger,
            period_locks: Mutex::new(HashMap::new()),
            min_unlock_reason_chars: DEFAULT_MIN_UNLOCK_REASON_CHARS,
        }
    }

    pub fn with_min_unlock_reason_chars(mut self, chars: usize) -> Self {
        self.min_unlock_reason_chars = chars;
        self
    }

    fn period_guard(&self, period: PayPeriod) -> PayguardResult<Arc<Mutex<()>>> {
        let mut locks = self
            .period_locks
            .lock()
            .map_err(|_| PayguardError::Storage("Period lock table poisoned".into()))?;
        Ok(Arc::clone(
            locks.entry(period).or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Generate a DRAFT batch for a period
    ///
    /// Active employees without an attendance record (or without a salary
    /// structure) are excluded with a warning, never paid a defaulted amount.
    /// Regeneration replaces an existing DRAFT; a LOCKED period is rejected.
    pub fn generate(&self, actor: &Identity, period: PayPeriod) -> PayguardResult<GenerateOutcome> {
        if !actor.role.can(Capability::GeneratePayroll) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not generate payroll",
                actor.role
            )));
        }

        let guard = self.period_guard(period)?;
        let _held = guard
            .lock()
            .map_err(|_| PayguardError::Storage("Period lock poisoned".into()))?;

        let previous = self.storage.batch_for_period(period)?;
        if matches!(&previous, Some(b) if b.is_locked()) {
            return Err(PayguardError::State(format!(
                "Payroll for {} is locked and cannot be regenerated",
                period
            )));
        }

        let mut lines = Vec::new();
        let mut warnings = Vec::new();
        let mut missing_attendance = Vec::new();

        for employee in self.storage.list_active_employees()? {
            let Some(attendance) = self.storage.attendance_for(&employee.employee_no, period)?
            else {
                warnings.push(format!(
                    "{} ({}): no attendance record for {}, excluded",
                    employee.employee_no, employee.name, period
                ));
                missing_attendance.push(employee.employee_no.clone());
                continue;
            };
            let Some(structure) = self.storage.salary_for(&employee.employee_no)? else {
                warnings.push(format!(
                    "{} ({}): no salary structure, excluded",
                    employee.employee_no, employee.name
                ));
                continue;
            };

            let (adjustments_add, adjustments_deduct) = self
                .storage
                .adjustment_totals(&employee.employee_no, period)?;
            lines.push(compute_line(
                &employee,
                &structure,
                &attendance,
                adjustments_add,
                adjustments_deduct,
            ));
        }

        let batch = PayrollBatch::new(period, lines, actor.username.clone());
        let batch_id = batch.id;
        self.storage.store_batch_for_period(batch.clone())?;

        let entry = AuditEntry::success(&actor.username, AuditAction::GenerateBatch)
            .with_resource(batch_id.to_string())
            .with_metadata(serde_json::json!({
                "period": period.to_string(),
                "employees": batch.lines.len(),
                "missing_attendance": missing_attendance,
                "gross_total": batch.gross_total,
                "net_total": batch.net_total,
            }));
        if let Err(e) = self.ledger.append(&entry) {
            // No batch without its audit trail
            match previous {
                Some(prev) => self.storage.store_batch_for_period(prev)?,
                None => self.storage.remove_batch(batch_id)?,
            }
            return Err(e);
        }

        Ok(GenerateOutcome { batch, warnings })
    }

    /// Lock a DRAFT batch, making it immutable
    pub fn lock(&self, actor: &Identity, batch_id: Uuid) -> PayguardResult<PayrollBatch> {
        if !actor.role.can(Capability::LockPayroll) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not lock payroll",
                actor.role
            )));
        }

        let period = self.storage.batch(batch_id)?.period;
        let guard = self.period_guard(period)?;
        let _held = guard
            .lock()
            .map_err(|_| PayguardError::Storage("Period lock poisoned".into()))?;

        let locked = self.storage.lock_batch(batch_id, &actor.username, Utc::now())?;

        let entry = AuditEntry::success(&actor.username, AuditAction::LockBatch)
            .with_resource(batch_id.to_string())
            .with_metadata(serde_json::json!({
                "period": locked.period.to_string(),
                "employees": locked.lines.len(),
                "net_total": locked.net_total,
            }));
        if let Err(e) = self.ledger.append(&entry) {
            self.storage.unlock_batch(batch_id)?;
            return Err(e);
        }
        Ok(locked)
    }

    /// Unlock a LOCKED batch
    ///
    /// Requires an explicit confirmation flag and a substantive justification;
    /// the discarded lock state is preserved in a high-severity audit entry.
    pub fn unlock(
        &self,
        actor: &Identity,
        batch_id: Uuid,
        confirmed: bool,
        reason: &str,
    ) -> PayguardResult<PayrollBatch> {
        if !actor.role.can(Capability::UnlockPayroll) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not unlock payroll",
                actor.role
            )));
        }
        if !confirmed {
            return Err(PayguardError::Validation(
                "Unlock requires explicit confirmation".into(),
            ));
        }
        let reason = reason.trim();
        if reason.chars().count() < self.min_unlock_reason_chars {
            return Err(PayguardError::Validation(format!(
                "Unlock reason must be at least {} characters",
                self.min_unlock_reason_chars
            )));
        }

        let before = self.storage.batch(batch_id)?;
        let period = before.period;
        let guard = self.period_guard(period)?;
        let _held = guard
            .lock()
            .map_err(|_| PayguardError::Storage("Period lock poisoned".into()))?;

        // Snapshot under the period guard so the recorded state is the one
        // actually being discarded
        let before = self.storage.batch(batch_id)?;
        let snapshot = before.lock_snapshot();
        let unlocked = self.storage.unlock_batch(batch_id)?;

        let entry = AuditEntry::success(&actor.username, AuditAction::UnlockBatchCritical)
            .with_resource(batch_id.to_string())
            .with_metadata(serde_json::json!({
                "period": period.to_string(),
                "reason": reason,
            }))
            .with_prior_state(snapshot);
        if let Err(e) = self.ledger.append(&entry) {
            self.storage
                .restore_lock(batch_id, before.locked_by.clone(), before.locked_at)?;
            return Err(e);
        }
        Ok(unlocked)
    }

    pub fn batch(&self, batch_id: Uuid) -> PayguardResult<PayrollBatch> {
        self.storage.batch(batch_id)
    }

    pub fn batch_for_period(&self, period: PayPeriod) -> PayguardResult<Option<PayrollBatch>> {
        self.storage.batch_for_period(period)
    }
}

/// Compute one employee's pay line
///
/// Each monetary step quantizes to the cent before feeding the next, so the
/// line's totals are plain integer sums with no residual drift.
fn compute_line(
    employee: &Employee,
    structure: &SalaryStructure,
    attendance: &Attendance,
    adjustments_add: Money,
    adjustments_deduct: Money,
) -> PayLine {
    let base_salary = structure.base_salary;
    let overtime_pay = structure
        .hourly_rate
        .mul_rate(attendance.overtime_hours.mul(structure.overtime_multiplier));
    let allowances_total = structure.allowances_total();
    let gross = base_salary + overtime_pay + allowances_total + adjustments_add;

    let absence_deduction = structure.daily_deduction.mul_rate(attendance.absence_days);
    let fixed_deductions = structure.deductions_total();
    // Income tax is carried as an explicit zero until a tax table is wired in
    let tax = Money::zero();
    let total_deductions = absence_deduction + fixed_deductions + adjustments_deduct + tax;

    PayLine {
        employee_no: employee.employee_no.clone(),
        employee_name: employee.name.clone(),
        base_salary,
        overtime_pay,
        allowances_total,
        adjustments_add,
        gross,
        absence_deduction,
        fixed_deductions,
        adjustments_deduct,
        tax,
        total_deductions,
        net: gross - total_deductions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Adjustment, AdjustmentKind, Rate, Role};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        storage: Arc<Storage>,
        ledger: Arc<AuditLedger>,
        engine: PayrollEngine,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("data")).unwrap());
        let ledger = Arc::new(AuditLedger::new(dir.path().join("audit.log")));
        let engine = PayrollEngine::new(Arc::clone(&storage), Arc::clone(&ledger));
        Fixture {
            _dir: dir,
            storage,
            ledger,
            engine,
        }
    }

    fn finance() -> Identity {
        Identity {
            username: "fiona".into(),
            role: Role::Finance,
        }
    }

    fn test_period() -> PayPeriod {
        "2024-03".parse().unwrap()
    }

    fn seed_employee(fx: &Fixture, no: &str) {
        fx.storage
            .insert_employee(Employee::new(
                no,
                format!("Employee {}", no),
                "Engineering",
                NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            ))
            .unwrap();
    }

    // base 5000.00, hourly 31.25, x1.5 overtime, 200.00 allowance,
    // 150.00 fixed deduction
    fn seed_structure(fx: &Fixture, no: &str) {
        let mut structure = SalaryStructure::new(no, Money::parse("5000.00").unwrap());
        structure.hourly_rate = Money::parse("31.25").unwrap();
        structure.daily_deduction = Money::parse("100.00").unwrap();
        structure
            .allowances
            .insert("meal".into(), Money::parse("200.00").unwrap());
        structure
            .deductions
            .insert("social_insurance".into(), Money::parse("150.00").unwrap());
        fx.storage.upsert_salary_structure(structure).unwrap();
    }

    fn seed_attendance(fx: &Fixture, no: &str, overtime_hours: &str) {
        fx.storage
            .upsert_attendance(Attendance {
                employee_no: no.into(),
                period: test_period(),
                work_days: 22,
                overtime_hours: Rate::parse(overtime_hours).unwrap(),
                absence_days: Rate::zero(),
            })
            .unwrap();
    }

    #[test]
    fn test_line_arithmetic_is_exact() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "10");

        let outcome = fx.engine.generate(&finance(), test_period()).unwrap();
        assert_eq!(outcome.batch.lines.len(), 1);
        let line = &outcome.batch.lines[0];

        // 31.25 * (10 * 1.5) = 468.75 exactly
        assert_eq!(line.overtime_pay.to_string(), "468.75");
        assert_eq!(line.gross.to_string(), "5668.75");
        assert_eq!(line.total_deductions.to_string(), "150.00");
        assert_eq!(line.net.to_string(), "5518.75");
        assert_eq!(line.tax, Money::zero());

        assert_eq!(outcome.batch.gross_total, line.gross);
        assert_eq!(outcome.batch.net_total, line.net);
    }

    #[test]
    fn test_adjustments_flow_into_line() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");
        fx.storage
            .add_adjustment(Adjustment {
                employee_no: "E001".into(),
                period: test_period(),
                kind: AdjustmentKind::Add,
                amount: Money::parse("300.00").unwrap(),
                reason: Some("Quarterly bonus".into()),
            })
            .unwrap();
        fx.storage
            .add_adjustment(Adjustment {
                employee_no: "E001".into(),
                period: test_period(),
                kind: AdjustmentKind::Deduct,
                amount: Money::parse("50.00").unwrap(),
                reason: None,
            })
            .unwrap();

        let outcome = fx.engine.generate(&finance(), test_period()).unwrap();
        let line = &outcome.batch.lines[0];
        assert_eq!(line.adjustments_add.to_string(), "300.00");
        assert_eq!(line.adjustments_deduct.to_string(), "50.00");
        assert_eq!(line.gross.to_string(), "5500.00");
        assert_eq!(line.net.to_string(), "5300.00");
    }

    #[test]
    fn test_missing_attendance_excludes_with_warning() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");
        seed_employee(&fx, "E002");
        seed_structure(&fx, "E002");
        // E002 has no attendance record

        let outcome = fx.engine.generate(&finance(), test_period()).unwrap();
        assert_eq!(outcome.batch.lines.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("E002"));
        assert!(outcome.warnings[0].contains("no attendance"));

        let entries = fx.ledger.filter_by_action(AuditAction::GenerateBatch).unwrap();
        assert_eq!(entries[0].metadata["missing_attendance"][0], "E002");
    }

    #[test]
    fn test_generate_requires_capability() {
        let fx = fixture();
        let hr = Identity {
            username: "hana".into(),
            role: Role::Hr,
        };
        let err = fx.engine.generate(&hr, test_period()).unwrap_err();
        assert!(matches!(err, PayguardError::Auth(_)));
    }

    #[test]
    fn test_lock_then_regenerate_rejected() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");

        let batch = fx.engine.generate(&finance(), test_period()).unwrap().batch;
        fx.engine.lock(&finance(), batch.id).unwrap();

        let err = fx.engine.generate(&finance(), test_period()).unwrap_err();
        assert!(err.is_state());

        let entries = fx.ledger.filter_by_action(AuditAction::LockBatch).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unlock_requires_confirmation_and_reason() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");
        let batch = fx.engine.generate(&finance(), test_period()).unwrap().batch;
        fx.engine.lock(&finance(), batch.id).unwrap();

        let err = fx
            .engine
            .unlock(&finance(), batch.id, false, "correcting attendance data")
            .unwrap_err();
        assert!(err.is_validation());

        let err = fx
            .engine
            .unlock(&finance(), batch.id, true, "  typo  ")
            .unwrap_err();
        assert!(err.is_validation());

        // Still locked after both refusals
        assert!(fx.engine.batch(batch.id).unwrap().is_locked());
    }

    #[test]
    fn test_unlock_records_prior_state() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");
        let batch = fx.engine.generate(&finance(), test_period()).unwrap().batch;
        fx.engine.lock(&finance(), batch.id).unwrap();

        let unlocked = fx
            .engine
            .unlock(&finance(), batch.id, true, "correcting attendance data")
            .unwrap();
        assert!(!unlocked.is_locked());

        let entries = fx
            .ledger
            .filter_by_action(AuditAction::UnlockBatchCritical)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].action.is_high_severity());
        assert_eq!(entries[0].metadata["reason"], "correcting attendance data");
        assert_eq!(entries[0].prior_state["locked_by"], "fiona");
        assert_eq!(entries[0].prior_state["period"], "2024-03");
    }

    #[test]
    fn test_failed_audit_reverts_lock() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("data")).unwrap());
        // Ledger path is a directory, so every append fails
        let bad_ledger = Arc::new(AuditLedger::new(dir.path()));
        let engine = PayrollEngine::new(Arc::clone(&storage), bad_ledger);

        let batch = PayrollBatch::new(test_period(), vec![], "fiona");
        let id = batch.id;
        storage.store_batch_for_period(batch).unwrap();

        let err = engine.lock(&finance(), id).unwrap_err();
        assert!(matches!(err, PayguardError::Io(_)));
        assert!(!storage.batch(id).unwrap().is_locked());
    }

    #[test]
    fn test_regenerate_replaces_draft() {
        let fx = fixture();
        seed_employee(&fx, "E001");
        seed_structure(&fx, "E001");
        seed_attendance(&fx, "E001", "0");

        let first = fx.engine.generate(&finance(), test_period()).unwrap().batch;
        seed_employee(&fx, "E002");
        seed_structure(&fx, "E002");
        fx.storage
            .upsert_attendance(Attendance {
                employee_no: "E002".into(),
                period: test_period(),
                work_days: 22,
                overtime_hours: Rate::zero(),
                absence_days: Rate::zero(),
            })
            .unwrap();

        let second = fx.engine.generate(&finance(), test_period()).unwrap().batch;
        assert_ne!(first.id, second.id);
        assert_eq!(second.lines.len(), 2);
        assert!(fx.engine.batch(first.id).is_err());
    }
}
