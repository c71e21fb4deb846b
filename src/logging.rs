//! Structured logging setup.
//!
//! Spans wrap each coordinator stage and scheduler tick (see `coordinator`
//! and `scheduler`); this module only wires up the subscriber. JSON
//! formatting is used outside of `dev` so log aggregation can index fields
//! instead of grepping message text.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber.
///
/// `dev_mode` selects human-readable pretty output; otherwise JSON lines are
/// emitted, matching how this service is actually shipped (behind a log
/// collector, not a terminal).
pub fn init(dev_mode: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if dev_mode {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic() {
        // tracing_subscriber::registry panics if installed twice at process
        // level; this just checks construction doesn't blow up.
        let _ = std::panic::catch_unwind(|| init(true));
    }
}
