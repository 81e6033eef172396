//! JSON-file-backed storage for all payroll collections
//!
//! One JSON document per collection, held in memory behind a mutex and
//! written through atomically on every mutation. Persistence happens before
//! the in-memory state is updated, so a failed write leaves both sides on the
//! old value.
//!
//! The storage boundary is the second line of defense for batch immutability:
//! line mutation against a LOCKED batch is rejected here regardless of what
//! the caller checked.

pub mod file_io;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PayguardError, PayguardResult};
use crate::models::{
    Adjustment, AdjustmentKind, Attendance, BatchStatus, Credential, Employee, Money, PayLine,
    PayPeriod, PayrollBatch, SalaryStructure,
};

pub use file_io::{read_json, write_json_atomic};

/// Everything the store holds, mirrored one file per collection on disk
#[derive(Default)]
struct State {
    employees: BTreeMap<String, Employee>,
    salary_structures: BTreeMap<String, SalaryStructure>,
    attendance: Vec<Attendance>,
    adjustments: Vec<Adjustment>,
    credentials: BTreeMap<String, Credential>,
    batches: Vec<PayrollBatch>,
}

/// Serde wrappers so each collection file is a self-describing document
#[derive(Default, Serialize, Deserialize)]
struct EmployeeFile {
    employees: BTreeMap<String, Employee>,
}

#[derive(Default, Serialize, Deserialize)]
struct SalaryFile {
    salary_structures: BTreeMap<String, SalaryStructure>,
}

#[derive(Default, Serialize, Deserialize)]
struct AttendanceFile {
    attendance: Vec<Attendance>,
}

#[derive(Default, Serialize, Deserialize)]
struct AdjustmentFile {
    adjustments: Vec<Adjustment>,
}

#[derive(Default, Serialize, Deserialize)]
struct CredentialFile {
    credentials: BTreeMap<String, Credential>,
}

#[derive(Default, Serialize, Deserialize)]
struct BatchFile {
    batches: Vec<PayrollBatch>,
}

/// The persistent store for all payroll data
pub struct Storage {
    dir: PathBuf,
    state: Mutex<State>,
}

impl Storage {
    /// Open the store rooted at `dir`, loading any existing collections
    pub fn open(dir: impl AsRef<Path>) -> PayguardResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PayguardError::Storage(format!("Failed to create data dir: {}", e)))?;

        let employees: EmployeeFile = read_json(dir.join("employees.json"))?;
        let salaries: SalaryFile = read_json(dir.join("salary_structures.json"))?;
        let attendance: AttendanceFile = read_json(dir.join("attendance.json"))?;
        let adjustments: AdjustmentFile = read_json(dir.join("adjustments.json"))?;
        let credentials: CredentialFile = read_json(dir.join("credentials.json"))?;
        let batches: BatchFile = read_json(dir.join("batches.json"))?;

        Ok(Self {
            dir,
            state: Mutex::new(State {
                employees: employees.employees,
                salary_structures: salaries.salary_structures,
                attendance: attendance.attendance,
                adjustments: adjustments.adjustments,
                credentials: credentials.credentials,
                batches: batches.batches,
            }),
        })
    }

    fn lock(&self) -> PayguardResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PayguardError::Storage("Storage lock poisoned".into()))
    }

    // --- employees ---

    /// Insert a new employee; duplicate employee numbers are rejected
    pub fn insert_employee(&self, employee: Employee) -> PayguardResult<()> {
        let mut state = self.lock()?;
        if state.employees.contains_key(&employee.employee_no) {
            return Err(PayguardError::Duplicate {
                entity_type: "Employee",
                identifier: employee.employee_no,
            });
        }

        let mut employees = state.employees.clone();
        employees.insert(employee.employee_no.clone(), employee);
        write_json_atomic(
            self.dir.join("employees.json"),
            &EmployeeFile {
                employees: employees.clone(),
            },
        )?;
        state.employees = employees;
        Ok(())
    }

    pub fn get_employee(&self, employee_no: &str) -> PayguardResult<Employee> {
        let state = self.lock()?;
        state
            .employees
            .get(employee_no)
            .cloned()
            .ok_or_else(|| PayguardError::employee_not_found(employee_no))
    }

    pub fn list_active_employees(&self) -> PayguardResult<Vec<Employee>> {
        let state = self.lock()?;
        Ok(state
            .employees
            .values()
            .filter(|e| e.is_active())
            .cloned()
            .collect())
    }

    pub fn employee_count(&self) -> PayguardResult<usize> {
        Ok(self.lock()?.employees.len())
    }

    // --- salary structures ---

    pub fn upsert_salary_structure(&self, structure: SalaryStructure) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut structures = state.salary_structures.clone();
        structures.insert(structure.employee_no.clone(), structure);
        write_json_atomic(
            self.dir.join("salary_structures.json"),
            &SalaryFile {
                salary_structures: structures.clone(),
            },
        )?;
        state.salary_structures = structures;
        Ok(())
    }

    pub fn salary_for(&self, employee_no: &str) -> PayguardResult<Option<SalaryStructure>> {
        let state = self.lock()?;
        Ok(state.salary_structures.get(employee_no).cloned())
    }

    // --- attendance ---

    /// Insert or replace the attendance record for one employee and period
    pub fn upsert_attendance(&self, record: Attendance) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut attendance = state.attendance.clone();
        attendance
            .retain(|a| !(a.employee_no == record.employee_no && a.period == record.period));
        attendance.push(record);
        write_json_atomic(
            self.dir.join("attendance.json"),
            &AttendanceFile {
                attendance: attendance.clone(),
            },
        )?;
        state.attendance = attendance;
        Ok(())
    }

    pub fn attendance_for(
        &self,
        employee_no: &str,
        period: PayPeriod,
    ) -> PayguardResult<Option<Attendance>> {
        let state = self.lock()?;
        Ok(state
            .attendance
            .iter()
            .find(|a| a.employee_no == employee_no && a.period == period)
            .cloned())
    }

    // --- adjustments ---

    pub fn add_adjustment(&self, adjustment: Adjustment) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut adjustments = state.adjustments.clone();
        adjustments.push(adjustment);
        write_json_atomic(
            self.dir.join("adjustments.json"),
            &AdjustmentFile {
                adjustments: adjustments.clone(),
            },
        )?;
        state.adjustments = adjustments;
        Ok(())
    }

    /// Sum of one-off additions and deductions for an employee in a period
    pub fn adjustment_totals(
        &self,
        employee_no: &str,
        period: PayPeriod,
    ) -> PayguardResult<(Money, Money)> {
        let state = self.lock()?;
        let mut add = Money::zero();
        let mut deduct = Money::zero();
        for adj in state
            .adjustments
            .iter()
            .filter(|a| a.employee_no == employee_no && a.period == period)
        {
            match adj.kind {
                AdjustmentKind::Add => add = add + adj.amount,
                AdjustmentKind::Deduct => deduct = deduct + adj.amount,
            }
        }
        Ok((add, deduct))
    }

    // --- credentials ---

    pub fn credential(&self, username: &str) -> PayguardResult<Option<Credential>> {
        let state = self.lock()?;
        Ok(state.credentials.get(username).cloned())
    }

    pub fn insert_credential(&self, credential: Credential) -> PayguardResult<()> {
        let mut state = self.lock()?;
        if state.credentials.contains_key(&credential.username) {
            return Err(PayguardError::Duplicate {
                entity_type: "Credential",
                identifier: credential.username,
            });
        }

        let mut credentials = state.credentials.clone();
        credentials.insert(credential.username.clone(), credential);
        write_json_atomic(
            self.dir.join("credentials.json"),
            &CredentialFile {
                credentials: credentials.clone(),
            },
        )?;
        state.credentials = credentials;
        Ok(())
    }

    pub fn remove_credential(&self, username: &str) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut credentials = state.credentials.clone();
        if credentials.remove(username).is_none() {
            return Err(PayguardError::credential_not_found(username));
        }
        write_json_atomic(
            self.dir.join("credentials.json"),
            &CredentialFile {
                credentials: credentials.clone(),
            },
        )?;
        state.credentials = credentials;
        Ok(())
    }

    /// Apply a mutation to one credential and persist it
    pub fn update_credential<F>(&self, username: &str, mutate: F) -> PayguardResult<Credential>
    where
        F: FnOnce(&mut Credential),
    {
        let mut state = self.lock()?;
        let mut credentials = state.credentials.clone();
        let cred = credentials
            .get_mut(username)
            .ok_or_else(|| PayguardError::credential_not_found(username))?;
        mutate(cred);
        let updated = cred.clone();

        write_json_atomic(
            self.dir.join("credentials.json"),
            &CredentialFile {
                credentials: credentials.clone(),
            },
        )?;
        state.credentials = credentials;
        Ok(updated)
    }

    // --- batches ---

    pub fn batch(&self, id: Uuid) -> PayguardResult<PayrollBatch> {
        let state = self.lock()?;
        state
            .batches
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| PayguardError::batch_not_found(id.to_string()))
    }

    pub fn batch_for_period(&self, period: PayPeriod) -> PayguardResult<Option<PayrollBatch>> {
        let state = self.lock()?;
        Ok(state.batches.iter().find(|b| b.period == period).cloned())
    }

    pub fn list_batches(&self) -> PayguardResult<Vec<PayrollBatch>> {
        Ok(self.lock()?.batches.clone())
    }

    /// Store a freshly generated batch for its period
    ///
    /// An existing DRAFT batch for the same period is replaced; a LOCKED one
    /// rejects the whole operation. This is the storage-level guard against
    /// mutating finalized pay data.
    pub fn store_batch_for_period(&self, batch: PayrollBatch) -> PayguardResult<()> {
        let mut state = self.lock()?;
        if let Some(existing) = state.batches.iter().find(|b| b.period == batch.period) {
            if existing.status == BatchStatus::Locked {
                return Err(PayguardError::State(format!(
                    "Payroll for {} is locked and cannot be regenerated",
                    batch.period
                )));
            }
        }

        let mut batches = state.batches.clone();
        batches.retain(|b| b.period != batch.period);
        batches.push(batch);
        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(())
    }

    /// Remove a batch outright (used to back out a failed generation)
    pub fn remove_batch(&self, id: Uuid) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut batches = state.batches.clone();
        let before = batches.len();
        batches.retain(|b| b.id != id);
        if batches.len() == before {
            return Err(PayguardError::batch_not_found(id.to_string()));
        }
        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(())
    }

    /// Replace the lines of an existing batch; rejected when LOCKED
    pub fn replace_batch_lines(&self, id: Uuid, lines: Vec<PayLine>) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut batches = state.batches.clone();
        let batch = batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| PayguardError::batch_not_found(id.to_string()))?;
        if batch.is_locked() {
            return Err(PayguardError::State(format!(
                "Batch {} is locked; its lines cannot be modified",
                id
            )));
        }

        batch.gross_total = lines.iter().map(|l| l.gross).sum();
        batch.deduction_total = lines.iter().map(|l| l.total_deductions).sum();
        batch.net_total = lines.iter().map(|l| l.net).sum();
        batch.lines = lines;

        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(())
    }

    /// Transition a batch DRAFT -> LOCKED and persist it
    pub fn lock_batch(
        &self,
        id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> PayguardResult<PayrollBatch> {
        let mut state = self.lock()?;
        let mut batches = state.batches.clone();
        let batch = batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| PayguardError::batch_not_found(id.to_string()))?;
        batch.lock(actor, now)?;
        let updated = batch.clone();

        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(updated)
    }

    /// Transition a batch LOCKED -> DRAFT and persist it
    pub fn unlock_batch(&self, id: Uuid) -> PayguardResult<PayrollBatch> {
        let mut state = self.lock()?;
        let mut batches = state.batches.clone();
        let batch = batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| PayguardError::batch_not_found(id.to_string()))?;
        batch.unlock()?;
        let updated = batch.clone();

        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(updated)
    }

    /// Reinstate a lock that a failed operation had released
    pub fn restore_lock(
        &self,
        id: Uuid,
        locked_by: Option<String>,
        locked_at: Option<DateTime<Utc>>,
    ) -> PayguardResult<()> {
        let mut state = self.lock()?;
        let mut batches = state.batches.clone();
        let batch = batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| PayguardError::batch_not_found(id.to_string()))?;
        batch.status = BatchStatus::Locked;
        batch.locked_by = locked_by;
        batch.locked_at = locked_at;

        self.persist_batches(&batches)?;
        state.batches = batches;
        Ok(())
    }

    fn persist_batches(&self, batches: &[PayrollBatch]) -> PayguardResult<()> {
        write_json_atomic(
            self.dir.join("batches.json"),
            &BatchFile {
                batches: batches.to_vec(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmployeeStatus, Role};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn test_employee(no: &str) -> Employee {
        Employee::new(
            no,
            format!("Employee {}", no),
            "Engineering",
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap(),
        )
    }

    fn test_period() -> PayPeriod {
        "2024-03".parse().unwrap()
    }

    fn test_batch(period: PayPeriod) -> PayrollBatch {
        PayrollBatch::new(period, vec![], "finance")
    }

    #[test]
    fn test_insert_and_get_employee() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage.insert_employee(test_employee("E001")).unwrap();
        let loaded = storage.get_employee("E001").unwrap();
        assert_eq!(loaded.name, "Employee E001");
        assert_eq!(loaded.status, EmployeeStatus::Active);
    }

    #[test]
    fn test_duplicate_employee_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage.insert_employee(test_employee("E001")).unwrap();
        let err = storage.insert_employee(test_employee("E001")).unwrap_err();
        assert!(matches!(err, PayguardError::Duplicate { .. }));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.insert_employee(test_employee("E001")).unwrap();
            storage
                .insert_credential(Credential::new("alice", "$argon2id$stub", Role::Finance))
                .unwrap();
        }

        let storage = Storage::open(dir.path()).unwrap();
        assert!(storage.get_employee("E001").is_ok());
        assert!(storage.credential("alice").unwrap().is_some());
    }

    #[test]
    fn test_attendance_upsert_replaces() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        storage
            .upsert_attendance(Attendance {
                employee_no: "E001".into(),
                period,
                work_days: 20,
                overtime_hours: crate::models::Rate::from_int(5),
                absence_days: crate::models::Rate::zero(),
            })
            .unwrap();
        storage
            .upsert_attendance(Attendance {
                employee_no: "E001".into(),
                period,
                work_days: 22,
                overtime_hours: crate::models::Rate::zero(),
                absence_days: crate::models::Rate::zero(),
            })
            .unwrap();

        let record = storage.attendance_for("E001", period).unwrap().unwrap();
        assert_eq!(record.work_days, 22);
    }

    #[test]
    fn test_adjustment_totals() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        storage
            .add_adjustment(Adjustment {
                employee_no: "E001".into(),
                period,
                kind: AdjustmentKind::Add,
                amount: Money::from_cents(10_000),
                reason: Some("Referral bonus".into()),
            })
            .unwrap();
        storage
            .add_adjustment(Adjustment {
                employee_no: "E001".into(),
                period,
                kind: AdjustmentKind::Deduct,
                amount: Money::from_cents(2_500),
                reason: Some("Equipment damage".into()),
            })
            .unwrap();

        let (add, deduct) = storage.adjustment_totals("E001", period).unwrap();
        assert_eq!(add.cents(), 10_000);
        assert_eq!(deduct.cents(), 2_500);
    }

    #[test]
    fn test_update_credential() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage
            .insert_credential(Credential::new("alice", "$argon2id$stub", Role::Finance))
            .unwrap();

        let updated = storage
            .update_credential("alice", |c| c.failed_attempts = 3)
            .unwrap();
        assert_eq!(updated.failed_attempts, 3);
        assert_eq!(
            storage.credential("alice").unwrap().unwrap().failed_attempts,
            3
        );
    }

    #[test]
    fn test_locked_batch_cannot_be_regenerated() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        let batch = test_batch(period);
        let id = batch.id;
        storage.store_batch_for_period(batch).unwrap();
        storage.lock_batch(id, "finance", Utc::now()).unwrap();

        let err = storage
            .store_batch_for_period(test_batch(period))
            .unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn test_locked_batch_rejects_line_mutation() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        let batch = test_batch(period);
        let id = batch.id;
        storage.store_batch_for_period(batch).unwrap();
        storage.lock_batch(id, "finance", Utc::now()).unwrap();

        let err = storage.replace_batch_lines(id, vec![]).unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn test_draft_batch_replaced_on_regeneration() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        let first = test_batch(period);
        let first_id = first.id;
        storage.store_batch_for_period(first).unwrap();

        let second = test_batch(period);
        let second_id = second.id;
        storage.store_batch_for_period(second).unwrap();

        assert!(storage.batch(first_id).is_err());
        assert!(storage.batch(second_id).is_ok());
    }

    #[test]
    fn test_restore_lock() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let period = test_period();

        let batch = test_batch(period);
        let id = batch.id;
        storage.store_batch_for_period(batch).unwrap();
        let locked = storage.lock_batch(id, "finance", Utc::now()).unwrap();
        storage.unlock_batch(id).unwrap();

        storage
            .restore_lock(id, locked.locked_by.clone(), locked.locked_at)
            .unwrap();
        let restored = storage.batch(id).unwrap();
        assert!(restored.is_locked());
        assert_eq!(restored.locked_by.as_deref(), Some("finance"));
    }
}
