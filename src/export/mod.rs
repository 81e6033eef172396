//! CSV export with injection defense and file fingerprinting

pub mod csv;
pub mod sanitize;

pub use self::csv::{ExportReceipt, ExportService};
pub use sanitize::{is_safe_cell, sanitize_cell, FORMULA_TRIGGERS};
