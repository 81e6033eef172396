//! CSV import with per-row error isolation
//!
//! A bad row never aborts the file: each row is validated and stored on its
//! own, failures are collected, and the outcome reports how many rows landed.
//! Sensitive employee columns are encrypted before they touch storage; the
//! plaintext never enters a collection file.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::audit::{AuditAction, AuditEntry, AuditLedger};
use crate::auth::Identity;
use crate::crypto::{encrypt_field, KeyStore};
use crate::error::{PayguardError, PayguardResult};
use crate::models::{
    Adjustment, AdjustmentKind, Attendance, Capability, Employee, Money, PayPeriod, Rate,
    SalaryStructure,
};
use crate::storage::Storage;

/// Cap on error detail carried back to the caller; the counts stay exact
const MAX_REPORTED_ERRORS: usize = 10;

/// Aggregate result of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Every row landed
    Full,
    /// Some rows landed, some failed
    Partial,
    /// No row landed
    Failed,
}

/// Row counts and truncated error detail for one import run
#[derive(Debug)]
pub struct ImportOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// At most [`MAX_REPORTED_ERRORS`] row-level messages
    pub errors: Vec<String>,
}

impl ImportOutcome {
    pub fn status(&self) -> ImportStatus {
        match (self.succeeded, self.failed) {
            (_, 0) => ImportStatus::Full,
            (0, _) => ImportStatus::Failed,
            _ => ImportStatus::Partial,
        }
    }

    pub fn message(&self) -> String {
        match self.status() {
            ImportStatus::Full => format!("Imported {} rows", self.succeeded),
            ImportStatus::Partial => format!(
                "Imported {} rows, {} failed",
                self.succeeded, self.failed
            ),
            ImportStatus::Failed => format!("Import failed: all {} rows rejected", self.failed),
        }
    }

    fn record_error(&mut self, row: usize, message: impl std::fmt::Display) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("row {}: {}", row, message));
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmployeeRow {
    employee_no: String,
    name: String,
    #[serde(default)]
    department: String,
    hire_date: String,
    #[serde(default)]
    bank_card: Option<String>,
    #[serde(default)]
    id_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttendanceRow {
    employee_no: String,
    period: String,
    work_days: u32,
    #[serde(default)]
    overtime_hours: Option<String>,
    #[serde(default)]
    absence_days: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SalaryRow {
    employee_no: String,
    base_salary: String,
    #[serde(default)]
    hourly_rate: Option<String>,
    #[serde(default)]
    overtime_multiplier: Option<String>,
    #[serde(default)]
    daily_deduction: Option<String>,
    #[serde(default)]
    allowances_json: Option<String>,
    #[serde(default)]
    deductions_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdjustmentRow {
    employee_no: String,
    period: String,
    kind: String,
    amount: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Imports employee, attendance, salary, and adjustment CSV files
pub struct ImportService {
    storage: Arc<Storage>,
    keystore: Arc<KeyStore>,
    ledger: Arc<AuditLedger>,
}

impl ImportService {
    pub fn new(storage: Arc<Storage>, keystore: Arc<KeyStore>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            storage,
            keystore,
            ledger,
        }
    }

    /// Import employees from a CSV file
    ///
    /// Expected columns: `employee_no,name,department,hire_date,bank_card,id_number`
    /// with `hire_date` as `YYYY-MM-DD`. Bank card and ID number are optional
    /// and stored encrypted.
    pub fn import_employees(
        &self,
        actor: &Identity,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ImportOutcome> {
        if !actor.role.can(Capability::ImportRecords) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not import records",
                actor.role
            )));
        }

        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PayguardError::Import(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut outcome = ImportOutcome {
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (index, record) in reader.deserialize::<EmployeeRow>().enumerate() {
            let row_no = index + 2; // 1-based, after the header row
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    outcome.record_error(row_no, e);
                    continue;
                }
            };
            if let Err(e) = self.store_employee_row(row) {
                outcome.record_error(row_no, e);
            } else {
                outcome.succeeded += 1;
            }
        }

        self.ledger.append(
            &AuditEntry::success(&actor.username, AuditAction::ImportEmployees)
                .with_resource(path.display().to_string())
                .with_metadata(serde_json::json!({
                    "succeeded": outcome.succeeded,
                    "failed": outcome.failed,
                })),
        )?;
        Ok(outcome)
    }

    fn store_employee_row(&self, row: EmployeeRow) -> PayguardResult<()> {
        let employee_no = row.employee_no.trim();
        if employee_no.is_empty() {
            return Err(PayguardError::Validation("employee_no is required".into()));
        }
        if row.name.trim().is_empty() {
            return Err(PayguardError::Validation("name is required".into()));
        }
        let hire_date = NaiveDate::parse_from_str(row.hire_date.trim(), "%Y-%m-%d")
            .map_err(|_| {
                PayguardError::Validation(format!("Invalid hire_date '{}'", row.hire_date))
            })?;

        let mut employee = Employee::new(employee_no, row.name.trim(), row.department.trim(), hire_date);
        if let Some(card) = row.bank_card.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            employee.bank_card = Some(encrypt_field(&self.keystore, card)?);
        }
        if let Some(id) = row.id_number.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            employee.id_number = Some(encrypt_field(&self.keystore, id)?);
        }
        self.storage.insert_employee(employee)
    }

    /// Import monthly attendance from a CSV file
    ///
    /// Expected columns: `employee_no,period,work_days,overtime_hours,absence_days`
    /// with `period` as `YYYY-MM`. Re-imported rows replace the existing
    /// record for the same employee and period.
    pub fn import_attendance(
        &self,
        actor: &Identity,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ImportOutcome> {
        if !actor.role.can(Capability::ImportRecords) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not import records",
                actor.role
            )));
        }

        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PayguardError::Import(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut outcome = ImportOutcome {
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (index, record) in reader.deserialize::<AttendanceRow>().enumerate() {
            let row_no = index + 2;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    outcome.record_error(row_no, e);
                    continue;
                }
            };
            if let Err(e) = self.store_attendance_row(row) {
                outcome.record_error(row_no, e);
            } else {
                outcome.succeeded += 1;
            }
        }

        self.ledger.append(
            &AuditEntry::success(&actor.username, AuditAction::ImportAttendance)
                .with_resource(path.display().to_string())
                .with_metadata(serde_json::json!({
                    "succeeded": outcome.succeeded,
                    "failed": outcome.failed,
                })),
        )?;
        Ok(outcome)
    }

    /// Import salary structures from a CSV file
    ///
    /// Expected columns: `employee_no,base_salary,hourly_rate,overtime_multiplier,daily_deduction,allowances_json,deductions_json`.
    /// The two `*_json` columns hold JSON objects mapping item names to
    /// amounts. Everything after `base_salary` is optional; the overtime
    /// multiplier defaults to 1.5. Re-imported rows replace the existing
    /// structure for the same employee.
    pub fn import_salary_structures(
        &self,
        actor: &Identity,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ImportOutcome> {
        if !actor.role.can(Capability::ImportRecords) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not import records",
                actor.role
            )));
        }

        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PayguardError::Import(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut outcome = ImportOutcome {
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (index, record) in reader.deserialize::<SalaryRow>().enumerate() {
            let row_no = index + 2;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    outcome.record_error(row_no, e);
                    continue;
                }
            };
            if let Err(e) = self.store_salary_row(row) {
                outcome.record_error(row_no, e);
            } else {
                outcome.succeeded += 1;
            }
        }

        self.ledger.append(
            &AuditEntry::success(&actor.username, AuditAction::ImportSalaryStructures)
                .with_resource(path.display().to_string())
                .with_metadata(serde_json::json!({
                    "succeeded": outcome.succeeded,
                    "failed": outcome.failed,
                })),
        )?;
        Ok(outcome)
    }

    fn store_salary_row(&self, row: SalaryRow) -> PayguardResult<()> {
        let employee_no = row.employee_no.trim();
        // The structure must reference a known employee
        self.storage.get_employee(employee_no)?;

        let base_salary = Money::parse(row.base_salary.trim()).map_err(|_| {
            PayguardError::Validation(format!("Invalid base_salary '{}'", row.base_salary))
        })?;

        let mut structure = SalaryStructure::new(employee_no, base_salary);
        structure.hourly_rate = parse_optional_money(row.hourly_rate.as_deref(), "hourly_rate")?;
        if let Some(m) = row
            .overtime_multiplier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            structure.overtime_multiplier = Rate::parse(m).map_err(|_| {
                PayguardError::Validation(format!("Invalid overtime_multiplier '{}'", m))
            })?;
        }
        structure.daily_deduction =
            parse_optional_money(row.daily_deduction.as_deref(), "daily_deduction")?;
        structure.allowances = parse_money_map(row.allowances_json.as_deref(), "allowances_json")?;
        structure.deductions = parse_money_map(row.deductions_json.as_deref(), "deductions_json")?;

        self.storage.upsert_salary_structure(structure)
    }

    /// Import one-off adjustments from a CSV file
    ///
    /// Expected columns: `employee_no,period,kind,amount,reason` with `kind`
    /// as `add` or `deduct` and `period` as `YYYY-MM`. Each row appends a new
    /// adjustment; nothing is replaced.
    pub fn import_adjustments(
        &self,
        actor: &Identity,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ImportOutcome> {
        if !actor.role.can(Capability::ImportRecords) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not import records",
                actor.role
            )));
        }

        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PayguardError::Import(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut outcome = ImportOutcome {
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (index, record) in reader.deserialize::<AdjustmentRow>().enumerate() {
            let row_no = index + 2;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    outcome.record_error(row_no, e);
                    continue;
                }
            };
            if let Err(e) = self.store_adjustment_row(row) {
                outcome.record_error(row_no, e);
            } else {
                outcome.succeeded += 1;
            }
        }

        self.ledger.append(
            &AuditEntry::success(&actor.username, AuditAction::ImportAdjustments)
                .with_resource(path.display().to_string())
                .with_metadata(serde_json::json!({
                    "succeeded": outcome.succeeded,
                    "failed": outcome.failed,
                })),
        )?;
        Ok(outcome)
    }

    fn store_adjustment_row(&self, row: AdjustmentRow) -> PayguardResult<()> {
        let employee_no = row.employee_no.trim();
        // Adjustments must reference a known employee
        self.storage.get_employee(employee_no)?;

        let period: PayPeriod = row
            .period
            .trim()
            .parse()
            .map_err(|e| PayguardError::Validation(format!("Invalid period: {}", e)))?;

        let kind = match row.kind.trim().to_ascii_lowercase().as_str() {
            "add" => AdjustmentKind::Add,
            "deduct" => AdjustmentKind::Deduct,
            other => {
                return Err(PayguardError::Validation(format!(
                    "Invalid kind '{}', expected 'add' or 'deduct'",
                    other
                )))
            }
        };

        let amount = Money::parse(row.amount.trim())
            .map_err(|_| PayguardError::Validation(format!("Invalid amount '{}'", row.amount)))?;
        if amount <= Money::zero() {
            return Err(PayguardError::Validation(format!(
                "Adjustment amount must be positive, got '{}'",
                row.amount
            )));
        }

        self.storage.add_adjustment(Adjustment {
            employee_no: employee_no.to_string(),
            period,
            kind,
            amount,
            reason: row
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }

    fn store_attendance_row(&self, row: AttendanceRow) -> PayguardResult<()> {
        let employee_no = row.employee_no.trim();
        // Attendance must reference a known employee
        self.storage.get_employee(employee_no)?;

        let period: PayPeriod = row
            .period
            .trim()
            .parse()
            .map_err(|e| PayguardError::Validation(format!("Invalid period: {}", e)))?;

        let overtime_hours = parse_optional_rate(row.overtime_hours.as_deref(), "overtime_hours")?;
        let absence_days = parse_optional_rate(row.absence_days.as_deref(), "absence_days")?;

        self.storage.upsert_attendance(Attendance {
            employee_no: employee_no.to_string(),
            period,
            work_days: row.work_days,
            overtime_hours,
            absence_days,
        })
    }
}

fn parse_optional_rate(value: Option<&str>, field: &str) -> PayguardResult<Rate> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Rate::parse(s)
            .map_err(|_| PayguardError::Validation(format!("Invalid {} '{}'", field, s))),
        None => Ok(Rate::zero()),
    }
}

fn parse_optional_money(value: Option<&str>, field: &str) -> PayguardResult<Money> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Money::parse(s)
            .map_err(|_| PayguardError::Validation(format!("Invalid {} '{}'", field, s))),
        None => Ok(Money::zero()),
    }
}

/// Parse a JSON object column mapping item names to amounts
///
/// Amounts may be JSON strings (`"300.00"`) or bare numbers; an empty column
/// means no items.
fn parse_money_map(
    value: Option<&str>,
    field: &str,
) -> PayguardResult<std::collections::BTreeMap<String, Money>> {
    let raw = match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return Ok(std::collections::BTreeMap::new()),
    };
    let parsed: std::collections::BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw)
            .map_err(|e| PayguardError::Validation(format!("Invalid {}: {}", field, e)))?;

    let mut items = std::collections::BTreeMap::new();
    for (name, amount) in parsed {
        let text = match &amount {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let money = Money::parse(&text).map_err(|_| {
            PayguardError::Validation(format!("Invalid {} amount '{}' for '{}'", field, text, name))
        })?;
        items.insert(name, money);
    }
    Ok(items)
}
