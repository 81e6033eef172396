//! Authentication and account management

pub mod gateway;

pub use gateway::{AuthGateway, Identity, LoginOutcome, GENERIC_LOGIN_FAILURE};
