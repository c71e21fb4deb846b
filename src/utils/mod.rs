//! Utility modules for common functionality.

pub mod retry;
pub mod sanitize;
mod string;

pub use retry::{RetryConfig, RetryableError, retry};
pub use string::truncate_str;
