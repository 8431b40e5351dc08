//! Development-time tracing for debugging the loop.
//!
//! Tracing here is dev diagnostics via `RUST_LOG`, written to stderr and
//! never persisted. Product observability is the run directory: the JSON
//! artifacts and `events.log` are always written regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr in compact
/// format.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
