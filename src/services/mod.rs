//! Business services: payroll generation/lifecycle, CSV import, key rotation

pub mod import;
pub mod keys;
pub mod payroll;

pub use import::{ImportOutcome, ImportService, ImportStatus};
pub use keys::rotate_data_keys;
pub use payroll::{GenerateOutcome, PayrollEngine, DEFAULT_MIN_UNLOCK_REASON_CHARS};
