//! Persistence layer.
//!
//! Backs the three tables described in spec §3.1 (`users`, `accounts`,
//! `briefs`) with a `Repository` trait seam over a `sqlx::SqlitePool`, so
//! pipeline components depend on traits rather than a concrete pool.

mod pool;
pub mod repository;
pub mod retry;

pub use pool::{Db, connect, run_migrations};
pub use repository::{
    AccountRepository, BriefRepository, Repository, SqliteRepository, UserRepository,
};
pub use retry::{DbRetryConfig, retry_db};
