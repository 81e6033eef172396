//! Append-only audit ledger
//!
//! Entries are appended as JSON lines and flushed before the write is
//! considered complete. The ledger never rewrites or truncates; readback is
//! in insertion order. State-changing operations treat a failed append as a
//! failure of the operation itself.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{PayguardError, PayguardResult};

use super::entry::{AuditAction, AuditEntry};

/// Append-only JSONL ledger of audit entries
pub struct AuditLedger {
    path: PathBuf,
    // Serializes appends so concurrent writers cannot interleave lines
    write_lock: Mutex<()>,
}

impl AuditLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to disk
    pub fn append(&self, entry: &AuditEntry) -> PayguardResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PayguardError::Storage("Audit ledger lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PayguardError::Io(format!("Failed to create audit directory: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PayguardError::Io(format!("Failed to open audit ledger: {}", e)))?;

        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)
            .map_err(|e| PayguardError::Io(format!("Failed to append audit entry: {}", e)))?;
        file.flush()
            .map_err(|e| PayguardError::Io(format!("Failed to flush audit ledger: {}", e)))?;
        Ok(())
    }

    /// All entries, oldest first
    pub fn read_all(&self) -> PayguardResult<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path)
            .map_err(|e| PayguardError::Io(format!("Failed to open audit ledger: {}", e)))?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line =
                line.map_err(|e| PayguardError::Io(format!("Failed to read audit ledger: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
                PayguardError::Integrity(format!("Corrupt audit ledger entry: {}", e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The most recent `count` entries, oldest first
    pub fn read_recent(&self, count: usize) -> PayguardResult<Vec<AuditEntry>> {
        let mut entries = self.read_all()?;
        if entries.len() > count {
            entries.drain(..entries.len() - count);
        }
        Ok(entries)
    }

    /// Entries for one action, oldest first
    pub fn filter_by_action(&self, action: AuditAction) -> PayguardResult<Vec<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.action == action)
            .collect())
    }

    /// Entries recorded by one actor, oldest first
    pub fn filter_by_actor(&self, actor: &str) -> PayguardResult<Vec<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.actor == actor)
            .collect())
    }

    pub fn entry_count(&self) -> PayguardResult<usize> {
        Ok(self.read_all()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::Outcome;
    use tempfile::TempDir;

    fn test_ledger(dir: &TempDir) -> AuditLedger {
        AuditLedger::new(dir.path().join("audit.log"))
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);

        ledger
            .append(&AuditEntry::success("alice", AuditAction::Login))
            .unwrap();
        ledger
            .append(&AuditEntry::failure("bob", AuditAction::Login))
            .unwrap();
        ledger
            .append(&AuditEntry::success("alice", AuditAction::GenerateBatch))
            .unwrap();

        let entries = ledger.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].actor, "alice");
        assert_eq!(entries[1].outcome, Outcome::Failure);
        assert_eq!(entries[2].action, AuditAction::GenerateBatch);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);
        assert!(ledger.read_all().unwrap().is_empty());
        assert_eq!(ledger.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_read_recent() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);
        for i in 0..5 {
            ledger
                .append(&AuditEntry::success(format!("user{}", i), AuditAction::Login))
                .unwrap();
        }

        let recent = ledger.read_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].actor, "user3");
        assert_eq!(recent[1].actor, "user4");
    }

    #[test]
    fn test_filters() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);
        ledger
            .append(&AuditEntry::success("alice", AuditAction::Login))
            .unwrap();
        ledger
            .append(&AuditEntry::success("alice", AuditAction::LockBatch))
            .unwrap();
        ledger
            .append(&AuditEntry::success("bob", AuditAction::Login))
            .unwrap();

        assert_eq!(ledger.filter_by_action(AuditAction::Login).unwrap().len(), 2);
        assert_eq!(ledger.filter_by_actor("alice").unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_line_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        std::fs::write(&path, "{not json}\n").unwrap();

        let ledger = AuditLedger::new(&path);
        let err = ledger.read_all().unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_append_survives_existing_content() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);
        ledger
            .append(&AuditEntry::success("alice", AuditAction::Login))
            .unwrap();

        // A fresh handle must append, never truncate
        let reopened = AuditLedger::new(ledger.path());
        reopened
            .append(&AuditEntry::success("bob", AuditAction::Login))
            .unwrap();
        assert_eq!(reopened.entry_count().unwrap(), 2);
    }
}
