//! Custom error types for payguard
//!
//! This module defines the error hierarchy for the payroll core using thiserror
//! for ergonomic error definitions.
//!
//! Cryptographic failures surface as [`PayguardError::Integrity`] and are fatal
//! to the operation that raised them: they are never retried and never degrade
//! to a best-effort result. Business-rule failures surface as `Validation` and
//! are isolated to the affected item. Authentication failures carry their full
//! detail only into the audit ledger; callers receive a generic message.

use thiserror::Error;

/// The main error type for payguard operations
#[derive(Error, Debug)]
pub enum PayguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ciphertext/tag mismatch, unknown key version, or malformed envelope
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Validation errors for business records and inputs
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors (detailed reason stays in the audit ledger)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Batch lifecycle violations (lock/unlock from the wrong state)
    #[error("State error: {0}")]
    State(String),

    /// Import errors
    #[error("Import error: {0}")]
    Import(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Duplicate entity errors
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },
}

impl PayguardError {
    /// Create a "not found" error for employees
    pub fn employee_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Employee",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for payroll batches
    pub fn batch_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "PayrollBatch",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for credentials
    pub fn credential_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Credential",
            identifier: identifier.into(),
        }
    }

    /// Create an "unknown key version" integrity error
    pub fn unknown_key_version(version: u32) -> Self {
        Self::Integrity(format!("Unknown key version: {}", version))
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is an integrity error
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Check if this is a batch state error
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for PayguardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PayguardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for payguard operations
pub type PayguardResult<T> = Result<T, PayguardError>;
