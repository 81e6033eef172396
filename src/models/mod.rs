//! Core data models for payguard
//!
//! Money and rates are fixed-point; periods are calendar months; sensitive
//! employee fields are stored as encrypted envelopes; batches carry their own
//! lifecycle state machine.

pub mod batch;
pub mod credential;
pub mod employee;
pub mod money;
pub mod period;

pub use batch::{BatchStatus, PayLine, PayrollBatch};
pub use credential::{Capability, Credential, LockoutPolicy, Role};
pub use employee::{Adjustment, AdjustmentKind, Attendance, Employee, EmployeeStatus, SalaryStructure};
pub use money::{Money, MoneyParseError, Rate};
pub use period::{PayPeriod, PeriodParseError};
