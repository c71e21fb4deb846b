//! LLM call surface: a thin chat-completions client plus the tolerant JSON
//! reader every structured-output call site funnels through.

pub mod client;
pub mod json;

pub use client::{ChatMessage, LlmClient, LlmError};
pub use json::{parse_tolerant, parse_tolerant_array};
