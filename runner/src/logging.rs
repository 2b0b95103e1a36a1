//! Diagnostic tracing for `runner-fleet`.
//!
//! Events go to stderr so `render` and `plan` output on stdout stays clean
//! enough to pipe.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset, or `info` with `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=runner_fleet=debug runner-fleet apply fleet.toml
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
