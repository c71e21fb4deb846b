//! Configuration module.
//!
//! Handles application configuration loading, validation, and management.

mod types;

pub mod secrets;

pub use secrets::SecretString;
pub use types::*;
