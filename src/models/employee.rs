//! Employee, salary structure, attendance, and adjustment records
//!
//! Sensitive identifiers (bank card, national ID) are never stored in
//! plaintext: they live in [`EncryptedField`] envelopes tagged with the key
//! version that sealed them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;
use crate::models::{Money, PayPeriod, Rate};
use std::collections::BTreeMap;

/// Employment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl std::fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmployeeStatus::Active => write!(f, "active"),
            EmployeeStatus::Inactive => write!(f, "inactive"),
            EmployeeStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// An employee record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    /// Unique employee number (business identifier)
    pub employee_no: String,
    pub name: String,
    pub department: String,
    pub hire_date: NaiveDate,
    #[serde(default)]
    pub status: EmployeeStatus,

    /// Bank card number, field-encrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_card: Option<EncryptedField>,

    /// National ID number, field-encrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<EncryptedField>,

    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        employee_no: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        hire_date: NaiveDate,
    ) -> Self {
        Self {
            employee_no: employee_no.into(),
            name: name.into(),
            department: department.into(),
            hire_date,
            status: EmployeeStatus::Active,
            bank_card: None,
            id_number: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }
}

/// Salary configuration for one employee
///
/// `allowances` and `deductions` are named fixed monthly items (e.g. meal
/// allowance, social insurance); each value is quantized Money, so their sums
/// are exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalaryStructure {
    pub employee_no: String,
    pub base_salary: Money,
    pub hourly_rate: Money,
    pub overtime_multiplier: Rate,
    /// Deduction applied per absence day
    pub daily_deduction: Money,
    #[serde(default)]
    pub allowances: BTreeMap<String, Money>,
    #[serde(default)]
    pub deductions: BTreeMap<String, Money>,
}

impl SalaryStructure {
    pub fn new(employee_no: impl Into<String>, base_salary: Money) -> Self {
        Self {
            employee_no: employee_no.into(),
            base_salary,
            hourly_rate: Money::zero(),
            overtime_multiplier: Rate::from_scaled(15_000),
            daily_deduction: Money::zero(),
            allowances: BTreeMap::new(),
            deductions: BTreeMap::new(),
        }
    }

    /// Sum of all named allowances (exact: each item is already quantized)
    pub fn allowances_total(&self) -> Money {
        self.allowances.values().copied().sum()
    }

    /// Sum of all named fixed deductions
    pub fn deductions_total(&self) -> Money {
        self.deductions.values().copied().sum()
    }
}

/// Monthly attendance for one employee
///
/// Unique per (employee, period). An employee without an attendance record
/// for a period is excluded from that period's batch, never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub employee_no: String,
    pub period: PayPeriod,
    pub work_days: u32,
    pub overtime_hours: Rate,
    pub absence_days: Rate,
}

/// Direction of a one-off salary adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// Bonus, reimbursement
    Add,
    /// Fine, advance repayment
    Deduct,
}

/// A one-off salary adjustment for one employee in one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    pub employee_no: String,
    pub period: PayPeriod,
    pub kind: AdjustmentKind,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employee_defaults_active() {
        let e = Employee::new(
            "E001",
            "Alice",
            "Engineering",
            NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
        );
        assert!(e.is_active());
        assert!(e.bank_card.is_none());
    }

    #[test]
    fn test_allowance_and_deduction_totals() {
        let mut s = SalaryStructure::new("E001", Money::from_major_minor(5000, 0));
        s.allowances.insert("meal".into(), Money::from_cents(50_000));
        s.allowances
            .insert("transport".into(), Money::from_cents(20_000));
        s.deductions
            .insert("social_insurance".into(), Money::from_cents(80_000));
        assert_eq!(s.allowances_total().cents(), 70_000);
        assert_eq!(s.deductions_total().cents(), 80_000);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&EmployeeStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
