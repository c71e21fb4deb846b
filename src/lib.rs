//! brieflock — a meeting-preparation intelligence engine.
//!
//! Given an upcoming calendar event, harvests the owner's recent email,
//! Drive documents, and past meetings across every linked account,
//! classifies whether the event warrants prep at all, and synthesizes a
//! grounded [`domain::Brief`]: purpose, relationship context, a timeline of
//! relevant history, and concrete recommendations. A day-level aggregator
//! layers cross-meeting themes and conflicts on top, and a scheduler drives
//! the whole thing unattended ahead of each day's first meeting.
//!
//! ## Pipeline
//!
//! [`token_guard`] keeps OAuth tokens fresh per account; [`harvester`] fans
//! out across accounts to collect candidate artifacts; [`classifier`] and
//! [`purpose`] decide whether and why a meeting matters; [`relevance`]
//! filters and extracts from that raw harvest; [`attendee_research`] builds
//! per-person context; [`brief`] synthesizes the final narrative; and
//! [`coordinator`] streams progress through all of it. [`day_prep`] and
//! [`scheduler`] operate one layer up, across a user's whole day.

pub mod attendee_research;
pub mod brief;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod day_prep;
pub mod db;
pub mod domain;
pub mod error;
pub mod harvester;
pub mod http;
pub mod llm;
pub mod logging;
pub mod providers;
pub mod purpose;
pub mod push;
pub mod relevance;
pub mod scheduler;
pub mod token_guard;
pub mod tools;
pub mod utils;

pub use error::{ErrorCode, ErrorPayload, PrepError};

/// Version information, surfaced on `/health` and in startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
