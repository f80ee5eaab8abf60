//! Development-time tracing for debugging the conductor.
//!
//! Tracing is dev diagnostics via `RUST_LOG`, output to stderr. It is not
//! persisted and not part of the conductor's product output (session
//! records, branches, PRs).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG`, defaulting to `warn` if unset. `verbose` raises the
/// default to `conductor=debug` so error chains and resolved allowlists
/// are visible without an env var.
///
/// # Example
/// ```bash
/// RUST_LOG=conductor=debug cargo run -- run --item 001
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "conductor=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
