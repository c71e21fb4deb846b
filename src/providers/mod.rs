//! Thin typed wrappers around mail, drive, and calendar surfaces (spec
//! §4.2). Modeled on the teacher's `brain::provider` trait-object pattern:
//! one trait per surface, a single REST-backed implementation, and a small
//! factory function, so tests can substitute a `mockito`-backed double
//! without touching call sites.

pub mod calendar;
pub mod drive;
pub mod error;
pub mod factory;
pub mod mail;
pub mod truncate;

pub use calendar::CalendarClient;
pub use drive::DriveClient;
pub use error::ProviderError;
pub use factory::ProviderClients;
pub use mail::MailClient;

use chrono::{DateTime, Utc};

/// Window bounds shared by the three query shapes in §4.3.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}
