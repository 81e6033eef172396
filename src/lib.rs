//! # payguard
//!
//! Security and integrity core for an offline payroll administration tool.
//!
//! ## Features
//!
//! - **Field encryption**: AES-256-GCM envelopes for bank cards and ID
//!   numbers, with a versioned key ring and rotation
//! - **Authentication**: Argon2id password hashing, uniform login failures,
//!   and automatic lockout after repeated failures
//! - **Exact money**: fixed-point arithmetic quantized to the cent at every
//!   step, so batch totals never drift
//! - **Batch lifecycle**: DRAFT/LOCKED payroll batches with guarded
//!   transitions and a confirmed, justified, high-severity unlock
//! - **Audit trail**: append-only JSONL ledger; state-changing operations
//!   fail if their audit entry cannot be written
//! - **Safe interchange**: CSV import with per-row error isolation, CSV
//!   export with formula-injection defense and SHA-256 fingerprints

pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{PayguardError, PayguardResult};
