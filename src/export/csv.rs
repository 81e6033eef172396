//! CSV report generation
//!
//! Two reports: a per-line batch summary and a bank-transfer file. Every cell
//! passes through the formula-injection filter, and each written file is
//! fingerprinted with SHA-256; the hash goes into the audit entry so a
//! distributed report can later be checked against what was actually
//! exported.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditLedger};
use crate::auth::Identity;
use crate::crypto::{decrypt_field, KeyStore};
use crate::error::{PayguardError, PayguardResult};
use crate::models::Capability;
use crate::storage::Storage;

use super::sanitize::sanitize_cell;

/// Proof of what an export produced
#[derive(Debug, Clone)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub sha256_hex: String,
    pub rows: usize,
}

/// Writes batch reports to CSV files
pub struct ExportService {
    storage: Arc<Storage>,
    keystore: Arc<KeyStore>,
    ledger: Arc<AuditLedger>,
}

impl ExportService {
    pub fn new(storage: Arc<Storage>, keystore: Arc<KeyStore>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            storage,
            keystore,
            ledger,
        }
    }

    /// Export a batch's pay lines as a summary CSV
    pub fn export_batch_summary(
        &self,
        actor: &Identity,
        batch_id: Uuid,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ExportReceipt> {
        if !actor.role.can(Capability::ExportReports) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not export reports",
                actor.role
            )));
        }
        let path = path.as_ref();
        let batch = self.storage.batch(batch_id)?;

        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| PayguardError::Export(format!("Failed to create {}: {}", path.display(), e)))?;
        writer
            .write_record([
                "employee_no",
                "name",
                "base_salary",
                "overtime_pay",
                "allowances",
                "adjustments_add",
                "gross",
                "absence_deduction",
                "fixed_deductions",
                "adjustments_deduct",
                "tax",
                "total_deductions",
                "net",
            ])
            .map_err(|e| PayguardError::Export(format!("Failed to write header: {}", e)))?;

        for line in &batch.lines {
            let cells = [
                line.employee_no.clone(),
                line.employee_name.clone(),
                line.base_salary.to_string(),
                line.overtime_pay.to_string(),
                line.allowances_total.to_string(),
                line.adjustments_add.to_string(),
                line.gross.to_string(),
                line.absence_deduction.to_string(),
                line.fixed_deductions.to_string(),
                line.adjustments_deduct.to_string(),
                line.tax.to_string(),
                line.total_deductions.to_string(),
                line.net.to_string(),
            ];
            write_sanitized(&mut writer, &cells)?;
        }
        writer
            .flush()
            .map_err(|e| PayguardError::Export(format!("Failed to flush export: {}", e)))?;
        drop(writer);

        let receipt = build_receipt(path, batch.lines.len())?;
        self.audit_export(
            actor,
            AuditAction::ExportSummary,
            batch_id,
            &receipt,
            serde_json::json!({
                "period": batch.period.to_string(),
                "status": batch.status.to_string(),
            }),
        )?;
        Ok(receipt)
    }

    /// Export a LOCKED batch as a bank-transfer file
    ///
    /// Bank card numbers are decrypted on the fly for this file only; lines
    /// whose employee has no card on record are skipped and reported in the
    /// audit metadata. Only a finalized batch may be paid out, so a DRAFT
    /// batch is rejected.
    pub fn export_bank_transfer(
        &self,
        actor: &Identity,
        batch_id: Uuid,
        path: impl AsRef<Path>,
    ) -> PayguardResult<ExportReceipt> {
        if !actor.role.can(Capability::ExportReports) {
            return Err(PayguardError::Auth(format!(
                "Role '{}' may not export reports",
                actor.role
            )));
        }
        let path = path.as_ref();
        let batch = self.storage.batch(batch_id)?;
        if !batch.is_locked() {
            return Err(PayguardError::State(format!(
                "Batch {} must be locked before a bank-transfer export",
                batch_id
            )));
        }

        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| PayguardError::Export(format!("Failed to create {}: {}", path.display(), e)))?;
        writer
            .write_record(["employee_no", "name", "bank_card", "net"])
            .map_err(|e| PayguardError::Export(format!("Failed to write header: {}", e)))?;

        let mut rows = 0;
        let mut missing_card = Vec::new();
        for line in &batch.lines {
            let employee = self.storage.get_employee(&line.employee_no)?;
            let Some(card_field) = employee.bank_card.as_ref() else {
                missing_card.push(line.employee_no.clone());
                continue;
            };
            let card = decrypt_field(&self.keystore, card_field)?;
            let cells = [
                line.employee_no.clone(),
                line.employee_name.clone(),
                card,
                line.net.to_string(),
            ];
            write_sanitized(&mut writer, &cells)?;
            rows += 1;
        }
        writer
            .flush()
            .map_err(|e| PayguardError::Export(format!("Failed to flush export: {}", e)))?;
        drop(writer);

        let receipt = build_receipt(path, rows)?;
        self.audit_export(
            actor,
            AuditAction::ExportBankTransfer,
            batch_id,
            &receipt,
            serde_json::json!({
                "period": batch.period.to_string(),
                "missing_bank_card": missing_card,
            }),
        )?;
        Ok(receipt)
    }

    fn audit_export(
        &self,
        actor: &Identity,
        action: AuditAction,
        batch_id: Uuid,
        receipt: &ExportReceipt,
        extra: serde_json::Value,
    ) -> PayguardResult<()> {
        let mut metadata = serde_json::json!({
            "file": receipt.path.display().to_string(),
            "sha256": receipt.sha256_hex,
            "rows": receipt.rows,
        });
        if let (Some(obj), Some(extra_obj)) = (metadata.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }

        let entry = AuditEntry::success(&actor.username, action)
            .with_resource(batch_id.to_string())
            .with_metadata(metadata);
        if let Err(e) = self.ledger.append(&entry) {
            // An unaudited export must not exist on disk
            let _ = std::fs::remove_file(&receipt.path);
            return Err(e);
        }
        Ok(())
    }
}

fn write_sanitized<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    cells: &[String],
) -> PayguardResult<()> {
    let sanitized: Vec<String> = cells.iter().map(|c| sanitize_cell(c)).collect();
    writer
        .write_record(&sanitized)
        .map_err(|e| PayguardError::Export(format!("Failed to write row: {}", e)))
}

fn build_receipt(path: &Path, rows: usize) -> PayguardResult<ExportReceipt> {
    let bytes = std::fs::read(path)
        .map_err(|e| PayguardError::Export(format!("Failed to read back export: {}", e)))?;
    let digest = Sha256::digest(&bytes);
    let mut sha256_hex = String::with_capacity(64);
    for byte in digest {
        // LowerHex is not implemented for the digest output as a whole
        let _ = write!(sha256_hex, "{:02x}", byte);
    }
    Ok(ExportReceipt {
        path: path.to_path_buf(),
        sha256_hex,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_field;
    use crate::models::{
        BatchStatus, Employee, Money, PayLine, PayPeriod, PayrollBatch, Role,
    };
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        storage: Arc<Storage>,
        keystore: Arc<KeyStore>,
        ledger: Arc<AuditLedger>,
        service: ExportService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("data")).unwrap());
        let keystore = Arc::new(
            KeyStore::open("master-secret".into(), dir.path().join("keys.dat")).unwrap(),
        );
        let ledger = Arc::new(AuditLedger::new(dir.path().join("audit.log")));
        let service = ExportService::new(
            Arc::clone(&storage),
            Arc::clone(&keystore),
            Arc::clone(&ledger),
        );
        Fixture {
            dir,
            storage,
            keystore,
            ledger,
            service,
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

    fn line(no: &str, name: &str, net_cents: i64) -> PayLine {
        PayLine {
            employee_no: no.to_string(),
            employee_name: name.to_string(),
            base_salary: Money::from_cents(net_cents),
            overtime_pay: Money::zero(),
            allowances_total: Money::zero(),
            adjustments_add: Money::zero(),
            gross: Money::from_cents(net_cents),
            absence_deduction: Money::zero(),
            fixed_deductions: Money::zero(),
            adjustments_deduct: Money::zero(),
            tax: Money::zero(),
            total_deductions: Money::zero(),
            net: Money::from_cents(net_cents),
        }
    }

    fn seed_batch(fx: &Fixture, lines: Vec<PayLine>, locked: bool) -> Uuid {
        let mut batch = PayrollBatch::new(test_period(), lines, "fiona");
        if locked {
            batch.status = BatchStatus::Locked;
            batch.locked_by = Some("fiona".into());
            batch.locked_at = Some(chrono::Utc::now());
        }
        let id = batch.id;
        fx.storage.store_batch_for_period(batch).unwrap();
        id
    }

    #[test]
    fn test_summary_export_writes_and_hashes() {
        let fx = fixture();
        let id = seed_batch(&fx, vec![line("E001", "Alice", 551_875)], false);
        let out = fx.dir.path().join("summary.csv");

        let receipt = fx
            .service
            .export_batch_summary(&finance(), id, &out)
            .unwrap();
        assert_eq!(receipt.rows, 1);
        assert_eq!(receipt.sha256_hex.len(), 64);

        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("5518.75"));
        assert!(content.starts_with("employee_no,name"));

        let entries = fx.ledger.filter_by_action(AuditAction::ExportSummary).unwrap();
        assert_eq!(entries[0].metadata["sha256"], receipt.sha256_hex);
    }

    #[test]
    fn test_exported_cells_are_sanitized() {
        let fx = fixture();
        let id = seed_batch(&fx, vec![line("E001", "=HYPERLINK(\"evil\")", 100)], false);
        let out = fx.dir.path().join("summary.csv");

        fx.service
            .export_batch_summary(&finance(), id, &out)
            .unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("'=HYPERLINK"));
    }

    #[test]
    fn test_negative_amounts_are_neutralized() {
        let fx = fixture();
        let mut bad = line("E001", "Alice", 100);
        bad.adjustments_deduct = Money::from_cents(-5_000);
        let id = seed_batch(&fx, vec![bad], false);
        let out = fx.dir.path().join("summary.csv");

        fx.service
            .export_batch_summary(&finance(), id, &out)
            .unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("'-50.00"));
    }

    #[test]
    fn test_bank_transfer_decrypts_cards() {
        let fx = fixture();
        let mut employee = Employee::new(
            "E001",
            "Alice",
            "Engineering",
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap(),
        );
        employee.bank_card =
            Some(encrypt_field(&fx.keystore, "6222021234567890123").unwrap());
        fx.storage.insert_employee(employee).unwrap();
        fx.storage
            .insert_employee(Employee::new(
                "E002",
                "Bob",
                "Sales",
                NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            ))
            .unwrap();

        let id = seed_batch(
            &fx,
            vec![line("E001", "Alice", 551_875), line("E002", "Bob", 400_000)],
            true,
        );
        let out = fx.dir.path().join("bank.csv");

        let receipt = fx
            .service
            .export_bank_transfer(&finance(), id, &out)
            .unwrap();
        assert_eq!(receipt.rows, 1);

        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("6222021234567890123"));
        assert!(!content.contains("Bob,"));

        let entries = fx
            .ledger
            .filter_by_action(AuditAction::ExportBankTransfer)
            .unwrap();
        assert_eq!(entries[0].metadata["missing_bank_card"][0], "E002");
    }

    #[test]
    fn test_bank_transfer_requires_locked_batch() {
        let fx = fixture();
        let id = seed_batch(&fx, vec![line("E001", "Alice", 100)], false);
        let out = fx.dir.path().join("bank.csv");

        let err = fx
            .service
            .export_bank_transfer(&finance(), id, &out)
            .unwrap_err();
        assert!(err.is_state());
        assert!(!out.exists());
    }

    #[test]
    fn test_export_requires_capability() {
        let fx = fixture();
        let id = seed_batch(&fx, vec![], false);
        let hr = Identity {
            username: "hana".into(),
            role: Role::Hr,
        };
        let err = fx
            .service
            .export_batch_summary(&hr, id, fx.dir.path().join("x.csv"))
            .unwrap_err();
        assert!(matches!(err, PayguardError::Auth(_)));
    }
}
