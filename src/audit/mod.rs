//! Append-only audit trail
//!
//! The ledger is the system's security log: one immutable JSONL entry per
//! security-relevant operation, flushed on write, read back in insertion
//! order.

pub mod entry;
pub mod ledger;

pub use entry::{AuditAction, AuditEntry, Outcome};
pub use ledger::AuditLedger;
