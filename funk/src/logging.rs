//! Diagnostic tracing for funk commands.
//!
//! Output goes to stderr. The CI pipeline fails the `analyse` step on any
//! stderr output, so that command logs at `warn` unless `RUST_LOG` says
//! otherwise.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for most commands.
pub const DEFAULT_LEVEL: &str = "info";

/// Default filter for commands whose stderr is a failure signal.
pub const QUIET_LEVEL: &str = "warn";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_level`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=funk=debug funk run test1
/// ```
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
